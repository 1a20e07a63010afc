//! Framing codecs (spec §4.1, §6).
//!
//! Two independent framings over any reliable ordered byte stream: the
//! text `Content-Length` framing used on the IDE↔adapter leg, and a
//! compact binary framing used (by default) on the adapter↔debuggee
//! leg. Both are transport-agnostic: they are fed a `BufRead` and a
//! `Write`, never a socket type directly.

pub mod binary;
pub mod text;

pub use binary::{BinaryFrameKind, read_binary_frame, write_binary_frame};
pub use text::{read_text_frame, write_text_frame};
