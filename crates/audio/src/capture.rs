//! Mikrofon-Capture via cpal
//!
//! Oeffnet einen cpal InputStream mit fester Abtastrate (16 kHz, Mono).
//! Der Callback laesst jeden Frame durch die DSP-Kette laufen, sammelt
//! Samples und schickt Chunks fester Groesse als `Vec<f32>` in den
//! Ereignis-Kanal der Sitzung.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error};

use crate::dsp::AufnahmePipeline;
use crate::error::{AudioError, AudioResult};

/// Konfiguration fuer den Audio-Capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Kanalanzahl (der Gespraechskanal ist Mono)
    pub channels: u16,
    /// Chunk-Groesse in Frames
    pub chunk_groesse: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            chunk_groesse: 2048,
        }
    }
}

/// Audio-Capture-Stream
///
/// Haelt den cpal-Stream am Leben. Wird der AufnahmeStream gedroppt,
/// stoppt die Aufnahme und gibt das Geraet frei.
pub struct AufnahmeStream {
    _stream: Stream,
    config: CaptureConfig,
}

impl AufnahmeStream {
    /// Gibt die Konfiguration des Streams zurueck
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

/// Sammelt Samples und emittiert Chunks fester Groesse
struct ChunkSammler {
    puffer: Vec<f32>,
    chunk_groesse: usize,
    pipeline: AufnahmePipeline,
    chunk_tx: UnboundedSender<Vec<f32>>,
}

impl ChunkSammler {
    fn neu(
        chunk_groesse: usize,
        pipeline: AufnahmePipeline,
        chunk_tx: UnboundedSender<Vec<f32>>,
    ) -> Self {
        Self {
            puffer: Vec::with_capacity(chunk_groesse * 2),
            chunk_groesse,
            pipeline,
            chunk_tx,
        }
    }

    fn einspeisen(&mut self, samples: &[f32]) {
        self.puffer.extend_from_slice(samples);

        while self.puffer.len() >= self.chunk_groesse {
            let rest = self.puffer.split_off(self.chunk_groesse);
            let mut chunk = std::mem::replace(&mut self.puffer, rest);
            self.pipeline.verarbeiten(&mut chunk);
            if self.chunk_tx.send(chunk).is_err() {
                // Empfaenger weg – Sitzung beendet, Samples verwerfen
                self.puffer.clear();
                return;
            }
        }
    }
}

/// Startet die Mikrofon-Aufnahme auf dem gegebenen Geraet.
///
/// Chunks von `config.chunk_groesse` Frames werden nach der DSP-Kette
/// ueber `chunk_tx` geliefert. Der Rueckgabewert haelt den Stream am
/// Leben; Droppen stoppt die Aufnahme.
///
/// # Fehler
/// - Geraet unterstuetzt die Konfiguration nicht oder die Aufnahme kann
///   nicht gestartet werden (z.B. Zugriff verweigert). Der Aufrufer
///   bricht damit den Gespraechsstart ab.
pub fn aufnahme_starten(
    device: &Device,
    config: CaptureConfig,
    pipeline: AufnahmePipeline,
    chunk_tx: UnboundedSender<Vec<f32>>,
) -> AudioResult<AufnahmeStream> {
    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut sammler = ChunkSammler::neu(config.chunk_groesse, pipeline, chunk_tx);

    let err_fn = |err| error!("Capture-Fehler: {}", err);

    // Unterstuetzte Sample-Formate pruefen
    let supported = device
        .supported_input_configs()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?
        .find(|c| {
            c.min_sample_rate().0 <= config.sample_rate
                && c.max_sample_rate().0 >= config.sample_rate
                && c.channels() >= config.channels
        });

    let sample_format = supported
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::F32);

    let stream = match sample_format {
        SampleFormat::F32 => device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _| {
                    sammler.einspeisen(data);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        SampleFormat::I16 => device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _| {
                    let floats: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    sammler.einspeisen(&floats);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        SampleFormat::U8 => device
            .build_input_stream(
                &stream_config,
                move |data: &[u8], _| {
                    let floats: Vec<f32> =
                        data.iter().map(|&s| (s as f32 - 128.0) / 128.0).collect();
                    sammler.einspeisen(&floats);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        _ => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Sample-Format: {:?}",
                sample_format
            )))
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    debug!(
        "Aufnahme gestartet: {}Hz {}ch, Chunk-Groesse {}",
        config.sample_rate, config.channels, config.chunk_groesse
    );

    Ok(AufnahmeStream {
        _stream: stream,
        config,
    })
}
