//! Restricted-vocabulary grammars.
//!
//! A grammar is a whitespace-separated token list, e.g. `"one two three [unk]"`.
//! It compiles into a two-state word loop:
//!
//! ```text
//!        word_i : word_i
//!   (0) ───────────────► ((1))
//!    ▲                     │
//!    └──────── ε ──────────┘
//! ```
//!
//! Tokens missing from the model vocabulary are skipped with a warning.

use tracing::{info, warn};

use crate::fst::{FstArc, VectorFst};
use crate::symbols::{SymbolTable, EPSILON};

pub fn compile_word_loop(grammar: &str, words: &SymbolTable) -> VectorFst {
    let mut fst = VectorFst::new();
    let loop_start = fst.add_state();
    let loop_end = fst.add_state();
    fst.set_start(loop_start);
    fst.set_final(loop_end, 0.0);
    fst.add_arc(loop_end, FstArc::new(EPSILON, EPSILON, 0.0, loop_start));

    let mut accepted = 0usize;
    for token in grammar.split_whitespace() {
        match words.id(token) {
            Some(id) if id != EPSILON => {
                if fst.find_arc(loop_start, id).is_none() {
                    fst.add_arc(loop_start, FstArc::new(id, id, 0.0, loop_end));
                    accepted += 1;
                }
            }
            _ => warn!("ignoring word missing in vocabulary: {token:?}"),
        }
    }
    fst.arc_sort_ilabel();

    info!(words = accepted, "compiled grammar word loop");
    fst
}
