//! `hark`: batch transcription of WAV files on top of `hark-core`.

pub mod cli;
