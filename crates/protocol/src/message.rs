//! Nachrichtentypen des Gespraechskanals
//!
//! Binaere Serialisierung: 1 Tag-Byte + Nutzdaten, kein serde auf dem
//! Audio-Pfad. Rohe Sample-Puffer werden verlustfrei eingebettet.
//!
//! ## Nachrichtenformate
//!
//! ```text
//! Ausgehend (Client -> Dienst)
//!   0x01 Open       Tag + Prompt (UTF-8)
//!   0x02 Close      Tag
//!   0x03 Audio      Tag + rohe 32-Bit-Float-Samples (normalisierte Reihenfolge)
//!   0x04 Zustand    Tag + Zustandsname (UTF-8, z.B. "waiting")
//!
//! Eingehend (Dienst -> Client)
//!   0x10 Audio      Tag + 8 Bytes ASCII-Token + 16-Bit-Samples (LE)
//!   0x11 Token      Tag + 8 Bytes ASCII-Token
//!   0x12 Interrupt  Tag + 8 Bytes ASCII-Token
//!   sonst           Unbekannt (wird vom Aufrufer ignoriert)
//! ```

use std::io;

use plauder_core::Token;

use crate::endian::{self, Endianness};

// ---------------------------------------------------------------------------
// Tag-Bytes
// ---------------------------------------------------------------------------

/// Gespraech eroeffnen (mit Kontext-Prompt)
pub const TAG_OPEN: u8 = 0x01;
/// Gespraech schliessen
pub const TAG_CLOSE: u8 = 0x02;
/// Mikrofon-Audio (32-Bit-Float)
pub const TAG_AUDIO_AUSGEHEND: u8 = 0x03;
/// Client-Zustandsmeldung
pub const TAG_ZUSTAND: u8 = 0x04;
/// Synthese-Audio (Token + 16-Bit-Samples)
pub const TAG_AUDIO_EINGEHEND: u8 = 0x10;
/// Neues Wiedergabe-Token
pub const TAG_TOKEN: u8 = 0x11;
/// Unterbrechung der laufenden Ausgabe
pub const TAG_INTERRUPT: u8 = 0x12;

// ---------------------------------------------------------------------------
// KlientZustand
// ---------------------------------------------------------------------------

/// Zustandsmeldungen, die der Client an den Dienst schickt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlientZustand {
    /// Kein Audio fuer das aktuelle Token gepuffert
    Warten,
}

impl KlientZustand {
    /// Name des Zustands auf der Leitung
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Warten => "waiting",
        }
    }

    fn aus_str(s: &str) -> io::Result<Self> {
        match s {
            "waiting" => Ok(Self::Warten),
            sonst => Err(dekodier_fehler(format!("Unbekannter Zustand: {sonst}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Ausgehend
// ---------------------------------------------------------------------------

/// Nachrichten vom Client an den Gespraechsdienst
///
/// Jede Nachricht wird pro Ereignis konstruiert, einmal gesendet und
/// nicht weiter vorgehalten.
#[derive(Debug, Clone, PartialEq)]
pub enum Ausgehend {
    /// Eroeffnet ein Gespraech mit dem gegebenen Kontext-Prompt
    Open { prompt: String },
    /// Beendet das laufende Gespraech
    Close,
    /// Ein Chunk Mikrofon-Audio: rohe 32-Bit-Float-Samples, bereits in
    /// die ausgehandelte Byte-Reihenfolge normalisiert
    Audio { pcm: Vec<u8> },
    /// Zustandsmeldung an den Dienst
    Zustand { zustand: KlientZustand },
}

impl Ausgehend {
    /// Baut eine Audio-Nachricht aus f32-Samples.
    ///
    /// Die Samples liegen in nativer Byte-Reihenfolge vor und werden in
    /// die vom Wiedergabeziel deklarierte Reihenfolge normalisiert.
    pub fn audio_aus_samples(samples: &[f32], ziel: Endianness) -> Self {
        let mut pcm = Vec::with_capacity(samples.len() * 4);
        for sample in samples {
            pcm.extend_from_slice(&sample.to_ne_bytes());
        }
        endian::normalisieren(&mut pcm, Endianness::native(), ziel);
        Self::Audio { pcm }
    }

    /// Serialisiert die Nachricht in ihre Binaerform (Tag + Nutzdaten)
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Open { prompt } => {
                let mut buf = Vec::with_capacity(1 + prompt.len());
                buf.push(TAG_OPEN);
                buf.extend_from_slice(prompt.as_bytes());
                buf
            }
            Self::Close => vec![TAG_CLOSE],
            Self::Audio { pcm } => {
                let mut buf = Vec::with_capacity(1 + pcm.len());
                buf.push(TAG_AUDIO_AUSGEHEND);
                buf.extend_from_slice(pcm);
                buf
            }
            Self::Zustand { zustand } => {
                let name = zustand.als_str();
                let mut buf = Vec::with_capacity(1 + name.len());
                buf.push(TAG_ZUSTAND);
                buf.extend_from_slice(name.as_bytes());
                buf
            }
        }
    }

    /// Deserialisiert eine ausgehende Nachricht (Gegenstueck fuer Tests
    /// und dienstseitige Implementierungen)
    ///
    /// # Fehler
    /// - `InvalidData` bei leerem Puffer, unbekanntem Tag oder
    ///   ungueltigen UTF-8-Nutzdaten
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        let (&tag, nutzdaten) = buf
            .split_first()
            .ok_or_else(|| dekodier_fehler("Leere Nachricht".into()))?;

        match tag {
            TAG_OPEN => Ok(Self::Open {
                prompt: utf8_nutzdaten(nutzdaten)?,
            }),
            TAG_CLOSE => Ok(Self::Close),
            TAG_AUDIO_AUSGEHEND => Ok(Self::Audio {
                pcm: nutzdaten.to_vec(),
            }),
            TAG_ZUSTAND => Ok(Self::Zustand {
                zustand: KlientZustand::aus_str(&utf8_nutzdaten(nutzdaten)?)?,
            }),
            sonst => Err(dekodier_fehler(format!(
                "Unbekanntes Ausgehend-Tag: 0x{sonst:02X}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Eingehend
// ---------------------------------------------------------------------------

/// Nachrichten vom Gespraechsdienst an den Client
#[derive(Debug, Clone, PartialEq)]
pub enum Eingehend {
    /// Ein Chunk Synthese-Audio: Token + signierte 16-Bit-Samples.
    /// Die Samples kommen bereits wiedergabefertig an (Little-Endian),
    /// es findet kein weiterer Byte-Tausch statt.
    Audio { token: Token, samples: Vec<i16> },
    /// Neues Wiedergabe-Token (beeinflusst laufende Ausgabe nicht)
    Token { token: Token },
    /// Unterbrechung: laufende und gepufferte Ausgabe verwerfen
    Interrupt { token: Token },
    /// Unbekannter Nachrichtentyp – wird vom Aufrufer verworfen
    /// (Vorwaertskompatibilitaet, kein Fehler)
    Unbekannt { tag: u8 },
}

impl Eingehend {
    /// Serialisiert die Nachricht in ihre Binaerform (Tag + Nutzdaten)
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Audio { token, samples } => {
                let mut buf = Vec::with_capacity(1 + Token::LAENGE + samples.len() * 2);
                buf.push(TAG_AUDIO_EINGEHEND);
                buf.extend_from_slice(token.als_bytes());
                for sample in samples {
                    buf.extend_from_slice(&sample.to_le_bytes());
                }
                buf
            }
            Self::Token { token } => {
                let mut buf = Vec::with_capacity(1 + Token::LAENGE);
                buf.push(TAG_TOKEN);
                buf.extend_from_slice(token.als_bytes());
                buf
            }
            Self::Interrupt { token } => {
                let mut buf = Vec::with_capacity(1 + Token::LAENGE);
                buf.push(TAG_INTERRUPT);
                buf.extend_from_slice(token.als_bytes());
                buf
            }
            Self::Unbekannt { tag } => vec![*tag],
        }
    }

    /// Deserialisiert eine eingehende Nachricht.
    ///
    /// Unbekannte Tags ergeben `Unbekannt` statt eines Fehlers, damit
    /// neue Nachrichtentypen alte Clients nicht brechen.
    ///
    /// # Fehler
    /// - `InvalidData` wenn die Nutzdaten kuerzer als der feste
    ///   8-Byte-Token-Header sind
    /// - `InvalidData` bei ungueltigem Token oder ungerader Sample-Laenge;
    ///   fehlerhafte Audio-Nutzdaten werden niemals mit Nullen aufgefuellt
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        let (&tag, nutzdaten) = buf
            .split_first()
            .ok_or_else(|| dekodier_fehler("Leere Nachricht".into()))?;

        match tag {
            TAG_AUDIO_EINGEHEND => {
                let (token, sample_bytes) = token_header(nutzdaten)?;
                if sample_bytes.len() % 2 != 0 {
                    return Err(dekodier_fehler(format!(
                        "Ungerade Sample-Laenge: {} Bytes",
                        sample_bytes.len()
                    )));
                }
                let samples = sample_bytes
                    .chunks_exact(2)
                    .map(|paar| i16::from_le_bytes([paar[0], paar[1]]))
                    .collect();
                Ok(Self::Audio { token, samples })
            }
            TAG_TOKEN => {
                let (token, rest) = token_header(nutzdaten)?;
                nutzdaten_ende(rest)?;
                Ok(Self::Token { token })
            }
            TAG_INTERRUPT => {
                let (token, rest) = token_header(nutzdaten)?;
                nutzdaten_ende(rest)?;
                Ok(Self::Interrupt { token })
            }
            sonst => Ok(Self::Unbekannt { tag: sonst }),
        }
    }
}

// ---------------------------------------------------------------------------
// Dekodier-Helfer
// ---------------------------------------------------------------------------

/// Liest den festen 8-Byte-Token-Header vom Anfang der Nutzdaten
fn token_header(nutzdaten: &[u8]) -> io::Result<(Token, &[u8])> {
    if nutzdaten.len() < Token::LAENGE {
        return Err(dekodier_fehler(format!(
            "Nutzdaten zu kurz fuer Token-Header: {} Bytes (erwartet mindestens {})",
            nutzdaten.len(),
            Token::LAENGE
        )));
    }
    let (token_bytes, rest) = nutzdaten.split_at(Token::LAENGE);
    let token = Token::aus_bytes(token_bytes).map_err(|e| dekodier_fehler(e.to_string()))?;
    Ok((token, rest))
}

/// Stellt sicher, dass keine Nutzdaten mehr folgen
fn nutzdaten_ende(rest: &[u8]) -> io::Result<()> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(dekodier_fehler(format!(
            "{} unerwartete Bytes nach dem Token",
            rest.len()
        )))
    }
}

fn utf8_nutzdaten(nutzdaten: &[u8]) -> io::Result<String> {
    String::from_utf8(nutzdaten.to_vec())
        .map_err(|e| dekodier_fehler(format!("Ungueltiges UTF-8: {e}")))
}

fn dekodier_fehler(grund: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, grund)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> Token {
        Token::neu(s).expect("Gueltiges Test-Token")
    }

    #[test]
    fn open_round_trip() {
        let original = Ausgehend::Open {
            prompt: "Du bist ein Terminassistent am Telefon.".into(),
        };
        let decoded = Ausgehend::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn open_leerer_prompt() {
        let original = Ausgehend::Open { prompt: String::new() };
        let decoded = Ausgehend::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn close_round_trip() {
        let decoded = Ausgehend::decode(&Ausgehend::Close.encode()).unwrap();
        assert_eq!(decoded, Ausgehend::Close);
    }

    #[test]
    fn audio_ausgehend_round_trip() {
        let original = Ausgehend::Audio {
            pcm: vec![0x00, 0x01, 0x02, 0x03, 0xFF, 0xFE, 0xFD, 0xFC],
        };
        let decoded = Ausgehend::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn audio_ausgehend_leer() {
        let original = Ausgehend::Audio { pcm: vec![] };
        let decoded = Ausgehend::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn zustand_round_trip() {
        let original = Ausgehend::Zustand {
            zustand: KlientZustand::Warten,
        };
        let encoded = original.encode();
        assert_eq!(&encoded[1..], b"waiting");
        let decoded = Ausgehend::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn audio_aus_samples_gleiche_reihenfolge() {
        let samples = [0.5f32, -0.25, 1.0];
        let msg = Ausgehend::audio_aus_samples(&samples, Endianness::native());
        if let Ausgehend::Audio { pcm } = msg {
            assert_eq!(pcm.len(), 12);
            assert_eq!(&pcm[0..4], &0.5f32.to_ne_bytes());
        } else {
            panic!("Erwartet Audio-Variante");
        }
    }

    #[test]
    fn audio_aus_samples_getauschte_reihenfolge() {
        let ziel = match Endianness::native() {
            Endianness::Little => Endianness::Big,
            Endianness::Big => Endianness::Little,
        };
        let samples = [1.0f32];
        let msg = Ausgehend::audio_aus_samples(&samples, ziel);
        if let Ausgehend::Audio { pcm } = msg {
            let mut erwartet = 1.0f32.to_ne_bytes();
            erwartet.reverse();
            assert_eq!(pcm, erwartet);
        } else {
            panic!("Erwartet Audio-Variante");
        }
    }

    #[test]
    fn eingehend_audio_round_trip() {
        let original = Eingehend::Audio {
            token: token("abc12345"),
            samples: vec![100, -100, i16::MAX, i16::MIN, 0],
        };
        let decoded = Eingehend::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn eingehend_audio_ohne_samples() {
        let original = Eingehend::Audio {
            token: token("00000000"),
            samples: vec![],
        };
        let decoded = Eingehend::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn eingehend_audio_samples_little_endian() {
        let encoded = Eingehend::Audio {
            token: token("tokXtokX"),
            samples: vec![0x0102],
        }
        .encode();
        // Niederwertiges Byte zuerst
        assert_eq!(encoded[1 + Token::LAENGE], 0x02);
        assert_eq!(encoded[2 + Token::LAENGE], 0x01);
    }

    #[test]
    fn eingehend_audio_zu_kurz() {
        // Nutzdaten kuerzer als der 8-Byte-Token-Header
        let mut buf = vec![TAG_AUDIO_EINGEHEND];
        buf.extend_from_slice(b"kurz");
        let result = Eingehend::decode(&buf);
        assert!(result.is_err(), "Zu kurze Nutzdaten muessen fehlschlagen");
    }

    #[test]
    fn eingehend_audio_ungerade_sample_bytes() {
        let mut buf = vec![TAG_AUDIO_EINGEHEND];
        buf.extend_from_slice(b"abc12345");
        buf.extend_from_slice(&[0x01, 0x02, 0x03]); // 3 Bytes, kein ganzes i16
        let result = Eingehend::decode(&buf);
        assert!(result.is_err(), "Ungerade Sample-Laenge darf nicht mit Nullen aufgefuellt werden");
    }

    #[test]
    fn token_round_trip() {
        let original = Eingehend::Token {
            token: token("zzzzzzzz"),
        };
        let decoded = Eingehend::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn interrupt_round_trip() {
        let original = Eingehend::Interrupt {
            token: token("stop0001"),
        };
        let decoded = Eingehend::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn token_nachricht_falsche_laenge() {
        let mut buf = vec![TAG_TOKEN];
        buf.extend_from_slice(b"nur7byt");
        assert!(Eingehend::decode(&buf).is_err());

        let mut buf = vec![TAG_TOKEN];
        buf.extend_from_slice(b"neun-byte");
        assert!(Eingehend::decode(&buf).is_err());
    }

    #[test]
    fn unbekanntes_tag_kein_fehler() {
        let decoded = Eingehend::decode(&[0x7F, 1, 2, 3]).unwrap();
        assert_eq!(decoded, Eingehend::Unbekannt { tag: 0x7F });
    }

    #[test]
    fn leere_nachricht_fehler() {
        assert!(Eingehend::decode(&[]).is_err());
        assert!(Ausgehend::decode(&[]).is_err());
    }

    #[test]
    fn ausgehend_unbekanntes_tag_fehler() {
        // Ausgehend kennt keine Vorwaertskompatibilitaet – der Client
        // erzeugt nur eigene Nachrichten
        assert!(Ausgehend::decode(&[0x7F]).is_err());
    }
}
