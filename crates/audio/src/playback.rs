//! Audio-Wiedergabe via cpal
//!
//! Stellt die Geraete-Naht fuer die Wiedergabe-Engine bereit: genau ein
//! Chunk ist zu jeder Zeit eingeplant. Der cpal-Callback zaehlt die
//! gelesenen Samples herunter und meldet das natuerliche Ende des Chunks
//! als `GeraetEreignis` in den Ereignis-Kanal der Sitzung.
//!
//! Abbrechen entwertet das laufende Ticket und setzt ein Verwerfen-Flag,
//! das der Callback beim naechsten Durchlauf honoriert. Ein spaetes
//! Beendigungs-Ereignis des alten Chunks traegt damit ein veraltetes
//! Ticket und wird von der Engine ignoriert.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};

use crate::dsp::GeteilteEchoReferenz;
use crate::error::{AudioError, AudioResult};

/// Ereignisse der Wiedergabeseite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeraetEreignis {
    /// Der eingeplante Chunk wurde vollstaendig abgespielt
    ChunkBeendet { ticket: u64 },
}

/// Geraete-Naht der Wiedergabe-Engine
///
/// Die Engine kennt nur diese Schnittstelle; cpal bleibt ein
/// Implementierungsdetail. Tests verwenden eine deterministische
/// Mock-Implementierung.
pub trait AusgabeGeraet {
    /// Plant genau einen Chunk zur Wiedergabe ein und gibt dessen
    /// Ticket zurueck. Das Ende wird asynchron gemeldet.
    fn einplanen(&mut self, samples: Vec<f32>) -> AudioResult<u64>;

    /// Haelt das Geraet an (idempotent)
    fn anhalten(&mut self) -> AudioResult<()>;

    /// Setzt das Geraet fort (idempotent)
    fn fortsetzen(&mut self) -> AudioResult<()>;

    /// Verwirft den laufenden Chunk und entwertet dessen Ticket, sodass
    /// sein Beendigungs-Ereignis nicht mehr zugeordnet werden kann
    fn abbrechen(&mut self) -> AudioResult<()>;
}

/// Konfiguration fuer die Audio-Wiedergabe
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Kanalanzahl
    pub channels: u16,
    /// Ring-Buffer Kapazitaet in Samples
    pub puffer_groesse: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            puffer_groesse: 44_100 * 10, // 10 Sekunden Puffer
        }
    }
}

/// cpal-gestuetzte Wiedergabe
pub struct CpalAusgabe {
    stream: Stream,
    producer: HeapProd<f32>,
    /// Verbleibende Samples des aktuell eingeplanten Chunks
    ausstehend: Arc<AtomicUsize>,
    /// Ticket des aktuell eingeplanten Chunks
    ticket: Arc<AtomicU64>,
    /// Verwerfen-Flag fuer den Callback (nach Abbruch)
    verwerfen: Arc<AtomicBool>,
    ereignis_tx: UnboundedSender<GeraetEreignis>,
    laeuft: bool,
    config: PlaybackConfig,
}

impl CpalAusgabe {
    /// Gibt die Konfiguration zurueck
    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }
}

impl AusgabeGeraet for CpalAusgabe {
    fn einplanen(&mut self, samples: Vec<f32>) -> AudioResult<u64> {
        let ticket = self.ticket.fetch_add(1, Ordering::AcqRel) + 1;

        let geschrieben = self.producer.push_slice(&samples);
        if geschrieben < samples.len() {
            warn!(
                "Wiedergabe-Puffer voll, {} Samples verworfen",
                samples.len() - geschrieben
            );
        }

        if geschrieben == 0 {
            // Leerer Chunk: der Callback sieht nichts, das Ende wird
            // direkt gemeldet
            self.ausstehend.store(0, Ordering::Release);
            let _ = self.ereignis_tx.send(GeraetEreignis::ChunkBeendet { ticket });
        } else {
            self.ausstehend.store(geschrieben, Ordering::Release);
        }

        Ok(ticket)
    }

    fn anhalten(&mut self) -> AudioResult<()> {
        if self.laeuft {
            self.stream
                .pause()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
            self.laeuft = false;
            debug!("Wiedergabe angehalten");
        }
        Ok(())
    }

    fn fortsetzen(&mut self) -> AudioResult<()> {
        if !self.laeuft {
            self.stream
                .play()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
            self.laeuft = true;
            debug!("Wiedergabe fortgesetzt");
        }
        Ok(())
    }

    fn abbrechen(&mut self) -> AudioResult<()> {
        // Ticket entwerten, dann den Callback die gepufferten Samples
        // verwerfen lassen
        self.ticket.fetch_add(1, Ordering::AcqRel);
        self.ausstehend.store(0, Ordering::Release);
        self.verwerfen.store(true, Ordering::Release);
        Ok(())
    }
}

/// Geteilter Zustand zwischen Steuerseite und cpal-Callback
struct CallbackZustand {
    ausstehend: Arc<AtomicUsize>,
    ticket: Arc<AtomicU64>,
    verwerfen: Arc<AtomicBool>,
    ereignis_tx: UnboundedSender<GeraetEreignis>,
    echo_referenz: Option<GeteilteEchoReferenz>,
}

impl CallbackZustand {
    /// Verarbeitet einen Callback-Durchlauf: `gelesen` Samples wurden
    /// aus dem Ring-Buffer entnommen und an das Geraet uebergeben.
    fn nach_lesen(&self, ausgabe: &[f32], gelesen: usize) {
        if let Some(referenz) = &self.echo_referenz {
            if let Some(mut r) = referenz.try_lock() {
                r.einspeisen(ausgabe);
            }
        }

        if gelesen == 0 {
            return;
        }

        let vorher = self
            .ausstehend
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |alt| {
                Some(alt.saturating_sub(gelesen))
            })
            .unwrap_or(0);

        // Chunk gerade vollstaendig abgespielt
        if vorher > 0 && vorher <= gelesen {
            let _ = self.ereignis_tx.send(GeraetEreignis::ChunkBeendet {
                ticket: self.ticket.load(Ordering::Acquire),
            });
        }
    }
}

/// Oeffnet die Wiedergabe auf dem gegebenen Geraet.
///
/// Beendigungs-Ereignisse laufen ueber `ereignis_tx` in die Sitzung.
/// Wird eine Echo-Referenz uebergeben, speist der Callback die
/// abgespielten Samples dort ein (fuer die Aufnahme-DSP-Kette).
pub fn ausgabe_oeffnen(
    device: &Device,
    config: PlaybackConfig,
    ereignis_tx: UnboundedSender<GeraetEreignis>,
    echo_referenz: Option<GeteilteEchoReferenz>,
) -> AudioResult<CpalAusgabe> {
    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let rb = HeapRb::<f32>::new(config.puffer_groesse);
    let (producer, mut consumer) = rb.split();

    let ausstehend = Arc::new(AtomicUsize::new(0));
    let ticket = Arc::new(AtomicU64::new(0));
    let verwerfen = Arc::new(AtomicBool::new(false));

    let zustand = CallbackZustand {
        ausstehend: Arc::clone(&ausstehend),
        ticket: Arc::clone(&ticket),
        verwerfen: Arc::clone(&verwerfen),
        ereignis_tx: ereignis_tx.clone(),
        echo_referenz,
    };

    let err_fn = |err| error!("Wiedergabe-Fehler: {}", err);

    let supported = device
        .supported_output_configs()
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
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _| {
                    if zustand.verwerfen.swap(false, Ordering::AcqRel) {
                        // Gepufferte Samples des abgebrochenen Chunks leeren
                        while consumer.try_pop().is_some() {}
                    }
                    let gelesen = consumer.pop_slice(data);
                    // Stille fuer fehlende Samples
                    data[gelesen..].fill(0.0);
                    zustand.nach_lesen(data, gelesen);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        SampleFormat::I16 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [i16], _| {
                    if zustand.verwerfen.swap(false, Ordering::AcqRel) {
                        while consumer.try_pop().is_some() {}
                    }
                    let mut float_buf = vec![0.0f32; data.len()];
                    let gelesen = consumer.pop_slice(&mut float_buf);
                    for (out, s) in data.iter_mut().zip(float_buf.iter()) {
                        *out = (*s * i16::MAX as f32)
                            .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                    }
                    zustand.nach_lesen(&float_buf, gelesen);
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
        "Wiedergabe geoeffnet: {}Hz {}ch",
        config.sample_rate, config.channels
    );

    Ok(CpalAusgabe {
        stream,
        producer,
        ausstehend,
        ticket,
        verwerfen,
        ereignis_tx,
        laeuft: true,
        config,
    })
}
