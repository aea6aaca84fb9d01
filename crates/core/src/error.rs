//! Fehlertypen fuer Plauder
//!
//! Zentraler Fehler-Enum der alle moeglichen Fehlerzustaende abdeckt.
//! Untermodule koennen eigene Fehler definieren und via `#[from]` konvertieren.

use thiserror::Error;

/// Globaler Result-Alias fuer Plauder
pub type Result<T> = std::result::Result<T, PlauderError>;

/// Alle moeglichen Fehler im Plauder-System
#[derive(Debug, Error)]
pub enum PlauderError {
    // --- Verbindung & Netzwerk ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    // --- Protokoll ---
    #[error("Dekodierfehler: {0}")]
    Dekodierung(String),

    #[error("Ungueltiges Token: {0}")]
    UngueltigesToken(String),

    // --- Audio ---
    #[error("Audio-Geraet: {0}")]
    Geraet(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl PlauderError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler die Sitzung beenden sollte
    ///
    /// Dekodierfehler betreffen nur die jeweilige Nachricht; Geraetefehler
    /// brechen den Gespraechsstart ab, nicht die Sitzung.
    pub fn ist_fatal(&self) -> bool {
        matches!(self, Self::Verbindung(_) | Self::Getrennt(_))
    }
}
