//! Audio input encodings.
//!
//! The recognizer accepts mono PCM in three encodings and remaps each into
//! the canonical `f32` waveform the feature pipeline consumes. The canonical
//! scale is the 16-bit amplitude range (`-32768.0..=32767.0`), which is what
//! acoustic front-ends trained on integer PCM expect. No resampling happens
//! here: samples are interpreted at the recognizer's configured rate.

pub mod wav;

/// One chunk of mono audio in any of the supported encodings.
#[derive(Debug, Clone, Copy)]
pub enum AudioData<'a> {
    /// Little-endian 16-bit PCM as raw bytes. A trailing odd byte is ignored.
    PcmBytes(&'a [u8]),
    /// Native 16-bit PCM samples.
    Pcm16(&'a [i16]),
    /// Floating samples already in 16-bit amplitude range.
    Float(&'a [f32]),
}

impl AudioData<'_> {
    /// Number of samples this chunk decodes to.
    pub fn len(&self) -> usize {
        match self {
            AudioData::PcmBytes(bytes) => bytes.len() / 2,
            AudioData::Pcm16(samples) => samples.len(),
            AudioData::Float(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remap into the canonical floating waveform.
    pub fn to_waveform(&self) -> Vec<f32> {
        match self {
            AudioData::PcmBytes(bytes) => bytes
                .chunks_exact(2)
                .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])))
                .collect(),
            AudioData::Pcm16(samples) => samples.iter().map(|&s| f32::from(s)).collect(),
            AudioData::Float(samples) => samples.to_vec(),
        }
    }
}

impl<'a> From<&'a [u8]> for AudioData<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        AudioData::PcmBytes(bytes)
    }
}

impl<'a> From<&'a [i16]> for AudioData<'a> {
    fn from(samples: &'a [i16]) -> Self {
        AudioData::Pcm16(samples)
    }
}

impl<'a> From<&'a [f32]> for AudioData<'a> {
    fn from(samples: &'a [f32]) -> Self {
        AudioData::Float(samples)
    }
}
