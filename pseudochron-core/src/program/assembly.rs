//! PIO assembly of the sequencer program
//!
//! Words arrive through the TX FIFO in `(reps, half_period)` pairs. The
//! output is driven only by side-set, so every edge lands on a known cycle:
//!
//! ```text
//!  0  start       pull; y = reps; reps == 0 -> wait_entry
//!  3              output high, enter pulse
//!  4  high        pull half period
//!  5..8           high for hp + 6, low for hp + 6
//!  9..15          next rep, or pull the next reps word
//! 16  wait_entry  pull timeout; 0 -> report (stop)
//! 19  wait_loop   trigger -> report, else count down (2 cycles/count)
//! 21  report      push remaining count (all ones on timeout)
//! 23  after_wait  pull reps; 0 -> indefinite prelude
//! 27  prelude     pull timeout; 0 -> report (stop), else block on trigger
//! ```
//!
//! A hardware-triggered start enters at the prelude with a dummy timeout
//! word already queued, so the unit holds until the first trigger edge.

use pio::{Program, RP2040_MAX_PROGRAM_SIZE};

/// A program sized for one PIO block's instruction memory
pub type PioProgram = Program<RP2040_MAX_PROGRAM_SIZE>;

/// The assembled sequencer program
pub struct Assembled {
    pub program: PioProgram,
    /// Address of the hardware-trigger entry, relative to the program start
    pub await_trigger: u8,
}

/// Assemble the sequencer program
///
/// Addresses are relative to the program start; loading it relocates them.
pub fn assemble() -> Assembled {
    let prg = pio::pio_asm!(
        ".side_set 1 opt",
        "start:",
        "    pull block",
        "    mov y, osr",
        "    jmp !y wait_entry",
        "    jmp y-- high side 1",
        "high:",
        "    pull block",
        "high_time:",
        "    mov x, osr [2]",
        "high_loop:",
        "    jmp x-- high_loop",
        "    mov x, osr side 0",
        "low_loop:",
        "    jmp x-- low_loop",
        "    jmp y-- next_rep",
        "    pull block",
        "    mov y, osr",
        "    jmp !y wait_entry",
        "    jmp y-- high side 1",
        "next_rep:",
        "    nop [2]",
        "    jmp high_time side 1 [1]",
        "wait_entry:",
        "    pull block",
        "    mov x, osr",
        "    jmp !x report",
        "wait_loop:",
        "    jmp pin report",
        "    jmp x-- wait_loop",
        "report:",
        "    mov isr, x",
        "    push block",
        "after_wait:",
        "    pull block",
        "    mov y, osr",
        "    jmp !y prelude",
        "    jmp y-- high side 1",
        "public prelude:",
        "    pull block",
        "    mov x, osr",
        "    jmp !x report",
        "    wait 1 pin 0",
        "    jmp after_wait",
    );

    Assembled {
        program: prg.program,
        await_trigger: prg.public_defines.prelude as u8,
    }
}
