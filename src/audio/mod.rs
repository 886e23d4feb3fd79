use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::engine_api::EngineCommand;

mod synth;

use synth::Engine;

pub struct AudioHandle {
    tx: Sender<EngineCommand>,
    _output_stream: cpal::Stream,
}

impl AudioHandle {
    // fire-and-forget; if the queue is somehow full the command drops
    pub fn send(&self, cmd: EngineCommand) {
        let _ = self.tx.try_send(cmd);
    }
}

pub fn start_audio() -> anyhow::Result<AudioHandle> {
    let (tx, rx) = crossbeam_channel::bounded::<EngineCommand>(1024);

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no default output device")?;
    let config = device
        .default_output_config()
        .context("no default output config")?;

    match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let output_stream = build_output_stream_f32(&device, &config.into(), rx)?;
            output_stream.play().context("failed to play output stream")?;
            Ok(AudioHandle {
                tx,
                _output_stream: output_stream,
            })
        }
        other => anyhow::bail!("unsupported sample format {other:?} (only f32 for now)"),
    }
}

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<EngineCommand>,
) -> anyhow::Result<cpal::Stream> {
    let channels = config.channels as usize;
    let mut engine = Engine::new(config.sample_rate);

    let err_fn = |err| eprintln!("audio output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info| {
            while let Ok(cmd) = rx.try_recv() {
                engine.handle_cmd(cmd);
            }
            for frame in data.chunks_mut(channels) {
                let sample = engine.next_sample();
                for out in frame.iter_mut() {
                    *out = sample;
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}
