pub mod recovery;
pub mod state_codec;
pub mod state_file;
pub mod state_writer;
