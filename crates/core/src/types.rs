//! Gemeinsame Typen fuer Plauder
//!
//! Das Wiedergabe-Token verwendet das Newtype-Pattern um Verwechslungen
//! mit anderen Byte-Puffern zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};

use crate::error::{PlauderError, Result};

/// Opakes Wiedergabe-Token (8 ASCII-Bytes)
///
/// Korreliert eine Sprachausgabe mit der Anfrage, die sie erzeugt hat.
/// Nach einer Unterbrechung dient das Token dazu, veraltete Audio-Chunks
/// zu erkennen und zu verwerfen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token([u8; 8]);

impl Token {
    /// Feste Token-Laenge in Bytes
    pub const LAENGE: usize = 8;

    /// Erstellt ein Token aus einem String (muss genau 8 ASCII-Zeichen haben)
    pub fn neu(s: &str) -> Result<Self> {
        Self::aus_bytes(s.as_bytes())
    }

    /// Erstellt ein Token aus rohen Bytes
    ///
    /// # Fehler
    /// - Laenge ungleich 8 Bytes
    /// - Bytes sind kein gueltiges ASCII
    pub fn aus_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LAENGE {
            return Err(PlauderError::UngueltigesToken(format!(
                "Token-Laenge {} (erwartet {})",
                bytes.len(),
                Self::LAENGE
            )));
        }
        if !bytes.is_ascii() {
            return Err(PlauderError::UngueltigesToken(
                "Token enthaelt Nicht-ASCII-Bytes".into(),
            ));
        }
        let mut inner = [0u8; Self::LAENGE];
        inner.copy_from_slice(bytes);
        Ok(Self(inner))
    }

    /// Gibt die rohen Token-Bytes zurueck
    pub fn als_bytes(&self) -> &[u8; Self::LAENGE] {
        &self.0
    }

    /// Gibt das Token als String-Slice zurueck
    pub fn als_str(&self) -> &str {
        // Konstruktion validiert ASCII, daher schlaegt dies nie fehl
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "token:{}", self.als_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_aus_str() {
        let t = Token::neu("abcd1234").unwrap();
        assert_eq!(t.als_str(), "abcd1234");
    }

    #[test]
    fn token_falsche_laenge() {
        assert!(Token::neu("kurz").is_err());
        assert!(Token::neu("viel-zu-langes-token").is_err());
        assert!(Token::aus_bytes(&[]).is_err());
    }

    #[test]
    fn token_nicht_ascii() {
        let bytes = [0xFFu8; 8];
        assert!(Token::aus_bytes(&bytes).is_err());
    }

    #[test]
    fn token_vergleichbar() {
        let a = Token::neu("00000001").unwrap();
        let b = Token::neu("00000001").unwrap();
        let c = Token::neu("00000002").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn token_display() {
        let t = Token::neu("deadbeef").unwrap();
        assert_eq!(t.to_string(), "token:deadbeef");
    }

    #[test]
    fn token_byte_round_trip() {
        let t = Token::neu("xyzw9876").unwrap();
        let t2 = Token::aus_bytes(t.als_bytes()).unwrap();
        assert_eq!(t, t2);
    }
}
