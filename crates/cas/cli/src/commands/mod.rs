//! Command implementations

mod emm;
mod reader;

pub(crate) use emm::{inspect_command, replay_command};
pub(crate) use reader::{identify_command, list_readers, open_reader, watch_command};
