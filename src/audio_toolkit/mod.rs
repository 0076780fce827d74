// Re-export all audio components
pub mod pcm;

pub use pcm::{decode_to_samples, encode_from_samples, save_wav_file};
