//! plauder-audio – Client Audio-Pipeline
//!
//! Vollstaendige Audio-Pipeline fuer Plauder:
//! - Mikrofon-Capture via cpal (16 kHz Mono, feste Chunk-Groesse)
//! - DSP: Echo-Daempfung, Rauschunterdrueckung, Pegelregelung
//! - Lautsprecher-Wiedergabe via cpal (44,1 kHz)
//! - Token-gesteuerte Wiedergabe-Warteschlange mit Unterbrechungs-Logik

pub mod capture;
pub mod device;
pub mod dsp;
pub mod error;
pub mod playback;
pub mod queue;

// Bequeme Re-Exporte der wichtigsten Typen
pub use capture::{aufnahme_starten, AufnahmeStream, CaptureConfig};
pub use device::{eingabegeraet_laden, ausgabegeraet_laden};
pub use dsp::{
    echo_referenz_neu, standard_pipeline, AudioProcessor, AufnahmePipeline, DspConfig,
    GeteilteEchoReferenz,
};
pub use error::{AudioError, AudioResult};
pub use playback::{ausgabe_oeffnen, AusgabeGeraet, CpalAusgabe, GeraetEreignis, PlaybackConfig};
pub use queue::{AudioChunk, EngineZustand, EntleerErgebnis, WiedergabeEngine};
