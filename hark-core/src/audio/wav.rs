//! WAV file loading for batch/offline ingestion.

use std::path::Path;

use crate::error::Result;

/// A decoded WAV file: mono samples in 16-bit amplitude range plus its rate.
#[derive(Debug, Clone)]
pub struct WavAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl WavAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Read a WAV file, down-mixing multi-channel audio to mono.
///
/// Integer formats are rescaled to the 16-bit range; float files (nominally
/// `[-1, 1]`) are scaled up to it.
pub fn read_wav_mono(path: &Path) -> Result<WavAudio> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| v * 32768.0))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample <= 16 {
                reader
                    .samples::<i16>()
                    .map(|s| s.map(f32::from))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            } else {
                let shift = spec.bits_per_sample.saturating_sub(16);
                let scale = (1_i64 << shift) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        }
    };

    if channels == 1 {
        return Ok(WavAudio {
            samples: interleaved,
            sample_rate: spec.sample_rate,
        });
    }

    let mut mono = Vec::with_capacity(interleaved.len() / channels);
    for frame in interleaved.chunks(channels) {
        let sum = frame.iter().copied().sum::<f32>();
        mono.push(sum / channels as f32);
    }
    Ok(WavAudio {
        samples: mono,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("hark-{}-{name}", std::process::id()))
    }

    #[test]
    fn stereo_int16_is_downmixed() {
        let path = temp_path("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        {
            let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
            for (l, r) in [(1000_i16, 3000_i16), (-200, -400)] {
                writer.write_sample(l).expect("write left");
                writer.write_sample(r).expect("write right");
            }
            writer.finalize().expect("finalize wav");
        }

        let audio = read_wav_mono(&path).expect("read wav");
        std::fs::remove_file(&path).ok();

        assert_eq!(audio.sample_rate, 8_000);
        assert_eq!(audio.samples, vec![2000.0, -300.0]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = read_wav_mono(&temp_path("does-not-exist.wav"));
        assert!(err.is_err());
    }
}
