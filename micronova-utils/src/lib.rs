pub mod octprint;
pub mod read_words;
pub mod write_words;
