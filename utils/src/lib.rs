pub mod networking;
pub mod object_stream;
pub mod triggers;
