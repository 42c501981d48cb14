use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::mpsc;

/// Blocking microphone capture. `capture` streams raw i16 frames into
/// `frames` until anything arrives on `stop` (or its sender is dropped),
/// then returns. Runs entirely on the worker thread that owns the
/// platform stream.
pub trait AudioSource: Send + Sync {
    fn capture(
        &self,
        sample_rate: u32,
        frames: mpsc::Sender<Vec<i16>>,
        stop: mpsc::Receiver<()>,
    ) -> Result<()>;
}

pub struct CpalSource;

impl AudioSource for CpalSource {
    fn capture(
        &self,
        sample_rate: u32,
        frames: mpsc::Sender<Vec<i16>>,
        stop: mpsc::Receiver<()>,
    ) -> Result<()> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No default input device found"))?;
        tracing::info!("Using input device: {}", device.name()?);

        let supported_configs = device.supported_input_configs()?;
        let mut config: Option<StreamConfig> = None;
        for supported in supported_configs {
            if supported.channels() == 1
                && supported.min_sample_rate().0 <= sample_rate
                && supported.max_sample_rate().0 >= sample_rate
            {
                config = Some(supported.with_sample_rate(cpal::SampleRate(sample_rate)).into());
                break;
            }
        }
        let final_config = config
            .ok_or_else(|| anyhow::anyhow!("No mono input configuration at {} Hz", sample_rate))?;

        let error_callback = |err| {
            tracing::error!("Audio stream error: {}", err);
        };

        let sample_format = device
            .default_input_config()
            .map(|c| c.sample_format())
            .unwrap_or(SampleFormat::I16);

        // The stream is created and dropped on this thread; cpal streams
        // are not Send so it can never cross a thread boundary.
        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &final_config,
                move |data: &[i16], _: &_| {
                    let _ = frames.send(data.to_vec());
                },
                error_callback,
                None,
            )?,
            SampleFormat::F32 => device.build_input_stream(
                &final_config,
                move |data: &[f32], _: &_| {
                    let converted: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    let _ = frames.send(converted);
                },
                error_callback,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &final_config,
                move |data: &[u16], _: &_| {
                    let converted: Vec<i16> =
                        data.iter().map(|&s| (s as i32 - 32768) as i16).collect();
                    let _ = frames.send(converted);
                },
                error_callback,
                None,
            )?,
            format => {
                return Err(anyhow::anyhow!("Unsupported sample format: {:?}", format));
            }
        };

        stream.play()?;
        tracing::info!("Microphone capture started");

        // Blocks until stop is signalled or the controller goes away.
        let _ = stop.recv();

        drop(stream);
        tracing::info!("Microphone capture stopped");
        Ok(())
    }
}
