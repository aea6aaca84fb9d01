//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Client ohne Konfigurationsdatei
//! lauffaehig ist.

use plauder_audio::{CaptureConfig, DspConfig, PlaybackConfig};
use plauder_protocol::Endianness;
use serde::{Deserialize, Serialize};

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KlientConfig {
    /// Verbindungs-Einstellungen (Gespraechskanal)
    pub verbindung: VerbindungsEinstellungen,
    /// Gespraechs-Einstellungen (Prompt, Byte-Reihenfolge)
    pub gespraech: GespraechsEinstellungen,
    /// Audio-Einstellungen
    pub audio: AudioEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Verbindungs-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbindungsEinstellungen {
    /// Adresse des Gespraechsdienstes
    pub adresse: String,
    /// Port des Gespraechskanals
    pub port: u16,
}

impl Default for VerbindungsEinstellungen {
    fn default() -> Self {
        Self {
            adresse: "127.0.0.1".into(),
            port: 4001,
        }
    }
}

/// Gespraechs-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GespraechsEinstellungen {
    /// Kontext-Prompt, der beim Eroeffnen mitgeschickt wird
    pub prompt: String,
    /// Byte-Reihenfolge, die das Wiedergabeziel erwartet
    /// ("little" | "big")
    pub endianness: Endianness,
}

impl Default for GespraechsEinstellungen {
    fn default() -> Self {
        Self {
            prompt: "You are a helpful assistant on the phone.".into(),
            endianness: Endianness::Little,
        }
    }
}

/// Audio-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Abtastrate der Aufnahme in Hz
    pub aufnahme_rate: u32,
    /// Abtastrate der Wiedergabe in Hz
    pub wiedergabe_rate: u32,
    /// Chunk-Groesse der Aufnahme in Frames
    pub chunk_groesse: usize,
    /// Name des Eingabegeraets (None = Standard)
    pub eingabegeraet: Option<String>,
    /// Name des Ausgabegeraets (None = Standard)
    pub ausgabegeraet: Option<String>,
    /// DSP-Einstellungen der Aufnahme
    pub dsp: DspEinstellungen,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            aufnahme_rate: 16_000,
            wiedergabe_rate: 44_100,
            chunk_groesse: 2048,
            eingabegeraet: None,
            ausgabegeraet: None,
            dsp: DspEinstellungen::default(),
        }
    }
}

impl AudioEinstellungen {
    /// Baut die Capture-Konfiguration der Audio-Pipeline
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.aufnahme_rate,
            channels: 1,
            chunk_groesse: self.chunk_groesse,
        }
    }

    /// Baut die Playback-Konfiguration der Audio-Pipeline
    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            sample_rate: self.wiedergabe_rate,
            channels: 1,
            puffer_groesse: self.wiedergabe_rate as usize * 10,
        }
    }
}

/// DSP-Einstellungen der Aufnahme
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DspEinstellungen {
    /// Echo-Daempfung aktivieren
    pub echo_daempfung: bool,
    /// Rauschunterdrueckung aktivieren
    pub rauschunterdrueckung: bool,
    /// Automatische Pegelregelung aktivieren
    pub pegelregelung: bool,
}

impl Default for DspEinstellungen {
    fn default() -> Self {
        Self {
            echo_daempfung: true,
            rauschunterdrueckung: true,
            pegelregelung: true,
        }
    }
}

impl DspEinstellungen {
    /// Konvertiert in die DSP-Konfiguration der Audio-Pipeline
    pub fn als_dsp_config(&self) -> DspConfig {
        DspConfig {
            echo_daempfung: self.echo_daempfung,
            rauschunterdrueckung: self.rauschunterdrueckung,
            pegelregelung: self.pegelregelung,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl KlientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    pfad = %pfad,
                    "Keine Konfigurationsdatei gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!("Konfiguration '{pfad}' nicht lesbar: {e}")),
        }
    }
}
