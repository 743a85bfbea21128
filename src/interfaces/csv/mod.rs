pub mod reply_writer;
pub mod transcript_reader;
