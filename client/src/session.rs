//! Sitzungs-Steuerung des Gespraechskanals
//!
//! Die Sitzung ist der eine logische Besitzer aller geteilten Ressourcen:
//! Sende-Haelfte der Verbindung, Aufnahme-Stream, Wiedergabe-Engine und
//! damit das aktuelle Token. Alle Zustandsuebergaenge laufen ueber genau
//! einen Ereignis-Loop – eingehende Nachrichten, Aufnahme-Chunks,
//! Geraete-Ereignisse und Benutzeraktionen werden nacheinander in je
//! einem Durchlauf verarbeitet. Serialisierung entsteht durch
//! Einzelbesitz, nicht durch Locks.

use plauder_audio::{
    aufnahme_starten, ausgabe_oeffnen, ausgabegeraet_laden, echo_referenz_neu,
    eingabegeraet_laden, standard_pipeline, AudioChunk, AufnahmeStream, CpalAusgabe,
    EntleerErgebnis, GeraetEreignis, WiedergabeEngine,
};
use plauder_core::{PlauderError, Result};
use plauder_protocol::{Ausgehend, Eingehend, KlientZustand};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, trace, warn};

use crate::config::KlientConfig;
use crate::connection::Verbindung;

// ---------------------------------------------------------------------------
// Ereignisse und Meldungen
// ---------------------------------------------------------------------------

/// Ereignisse, die der Sitzungs-Loop verarbeitet
#[derive(Debug)]
pub enum Ereignis {
    /// Benutzeraktion: Gespraech beginnen bzw. beenden
    Umschalten,
    /// Dekodierte Nachricht vom Gespraechsdienst
    Eingehend(Eingehend),
    /// Verbindung wurde dienstseitig getrennt
    Getrennt,
    /// Sitzung beenden (Programmende)
    Beenden,
}

/// Meldungen an die umgebende UI-Schicht
///
/// Die Sitzung meldet jeden Zustandswechsel, damit die Anzeige dem
/// internen Zustand folgt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitzungMeldung {
    GespraechBegonnen,
    GespraechBeendet,
}

/// Zustand der Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitzungZustand {
    /// Kein Gespraech aktiv
    Leerlauf,
    /// Gespraech laeuft: Aufnahme und Wiedergabe sind aktiv
    ImGespraech,
}

// ---------------------------------------------------------------------------
// Sitzung
// ---------------------------------------------------------------------------

/// Sitzungs-Steuerung
///
/// Besitzt exklusiv die Verbindung, die Wiedergabe-Engine und den
/// Aufnahme-Stream. `ausfuehren()` konsumiert die Sitzung und laeuft
/// bis zum Programmende.
pub struct Sitzung {
    config: KlientConfig,
    verbindung: Verbindung,
    zustand: SitzungZustand,
    /// Aufnahme-Guard; None = gestoppt. Droppen stoppt die Aufnahme,
    /// doppeltes Stoppen ist damit ein No-op.
    aufnahme: Option<AufnahmeStream>,
    /// Wiedergabe-Engine samt Geraet; existiert nur waehrend eines
    /// Gespraechs
    engine: Option<WiedergabeEngine<CpalAusgabe>>,
    ereignis_rx: UnboundedReceiver<Ereignis>,
    meldung_tx: UnboundedSender<SitzungMeldung>,
    chunk_tx: UnboundedSender<Vec<f32>>,
    chunk_rx: UnboundedReceiver<Vec<f32>>,
    geraet_tx: UnboundedSender<GeraetEreignis>,
    geraet_rx: UnboundedReceiver<GeraetEreignis>,
}

impl Sitzung {
    /// Erstellt eine neue Sitzung im Leerlauf
    pub fn neu(
        config: KlientConfig,
        verbindung: Verbindung,
        ereignis_rx: UnboundedReceiver<Ereignis>,
        meldung_tx: UnboundedSender<SitzungMeldung>,
    ) -> Self {
        let (chunk_tx, chunk_rx) = unbounded_channel();
        let (geraet_tx, geraet_rx) = unbounded_channel();
        Self {
            config,
            verbindung,
            zustand: SitzungZustand::Leerlauf,
            aufnahme: None,
            engine: None,
            ereignis_rx,
            meldung_tx,
            chunk_tx,
            chunk_rx,
            geraet_tx,
            geraet_rx,
        }
    }

    /// Aktueller Sitzungszustand
    pub fn zustand(&self) -> SitzungZustand {
        self.zustand
    }

    /// Fuehrt den Ereignis-Loop aus bis die Sitzung beendet wird.
    ///
    /// Haelt cpal-Streams und ist damit nicht Send; der Loop laeuft
    /// direkt im Haupt-Task statt in einem gespawnten Task.
    pub async fn ausfuehren(mut self) -> Result<()> {
        loop {
            tokio::select! {
                ereignis = self.ereignis_rx.recv() => {
                    match ereignis {
                        Some(Ereignis::Umschalten) => self.umschalten().await,
                        Some(Ereignis::Eingehend(nachricht)) => {
                            self.eingehend_verarbeiten(nachricht).await;
                        }
                        Some(Ereignis::Getrennt) => {
                            warn!("Verbindung verloren, Sitzung wird beendet");
                            self.gespraech_abbauen();
                            return Err(PlauderError::Getrennt(
                                "Gespraechsdienst hat die Verbindung geschlossen".into(),
                            ));
                        }
                        Some(Ereignis::Beenden) | None => {
                            self.beenden().await;
                            return Ok(());
                        }
                    }
                }
                Some(chunk) = self.chunk_rx.recv() => {
                    self.chunk_senden(chunk).await;
                }
                Some(ereignis) = self.geraet_rx.recv() => {
                    self.geraet_ereignis(ereignis).await;
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Benutzeraktion
    // -----------------------------------------------------------------

    /// Schaltet zwischen Leerlauf und Gespraech um
    async fn umschalten(&mut self) {
        match self.zustand {
            SitzungZustand::Leerlauf => {
                let prompt = self.config.gespraech.prompt.clone();
                if let Err(e) = self.verbindung.senden(Ausgehend::Open { prompt }).await {
                    error!("Gespraech konnte nicht eroeffnet werden: {}", e);
                    return;
                }

                match self.gespraech_aufbauen() {
                    Ok(()) => {
                        self.zustand = SitzungZustand::ImGespraech;
                        info!("Gespraech begonnen");
                        let _ = self.meldung_tx.send(SitzungMeldung::GespraechBegonnen);
                    }
                    Err(e) => {
                        // Geraetefehler bricht den Start ab, nicht die Sitzung
                        error!("Gespraechsstart abgebrochen: {}", e);
                        self.gespraech_abbauen();
                        let _ = self.verbindung.senden(Ausgehend::Close).await;
                    }
                }
            }
            SitzungZustand::ImGespraech => {
                if let Err(e) = self.verbindung.senden(Ausgehend::Close).await {
                    warn!("Close-Nachricht fehlgeschlagen: {}", e);
                }
                self.gespraech_abbauen();
                self.zustand = SitzungZustand::Leerlauf;
                info!("Gespraech beendet");
                let _ = self.meldung_tx.send(SitzungMeldung::GespraechBeendet);
            }
        }
    }

    /// Oeffnet Wiedergabe und Aufnahme fuer ein neues Gespraech
    fn gespraech_aufbauen(&mut self) -> Result<()> {
        if self.aufnahme.is_some() {
            return Err(PlauderError::intern("Aufnahme laeuft bereits"));
        }

        // Wiedergabe zuerst: die Aufnahme-DSP-Kette braucht die
        // Echo-Referenz der Wiedergabeseite
        let echo_referenz = self
            .config
            .audio
            .dsp
            .echo_daempfung
            .then(echo_referenz_neu);

        let ausgabe_geraet = ausgabegeraet_laden(self.config.audio.ausgabegeraet.as_deref())
            .map_err(|e| PlauderError::Geraet(e.to_string()))?;
        let ausgabe = ausgabe_oeffnen(
            &ausgabe_geraet,
            self.config.audio.playback_config(),
            self.geraet_tx.clone(),
            echo_referenz.clone(),
        )
        .map_err(|e| PlauderError::Geraet(e.to_string()))?;
        self.engine = Some(WiedergabeEngine::neu(ausgabe));

        let eingabe_geraet = eingabegeraet_laden(self.config.audio.eingabegeraet.as_deref())
            .map_err(|e| PlauderError::Geraet(e.to_string()))?;
        let pipeline = standard_pipeline(&self.config.audio.dsp.als_dsp_config(), echo_referenz);
        let aufnahme = aufnahme_starten(
            &eingabe_geraet,
            self.config.audio.capture_config(),
            pipeline,
            self.chunk_tx.clone(),
        )
        .map_err(|e| PlauderError::Geraet(e.to_string()))?;
        self.aufnahme = Some(aufnahme);

        Ok(())
    }

    /// Stoppt Aufnahme und Wiedergabe (idempotent)
    fn gespraech_abbauen(&mut self) {
        // Droppen des Guards stoppt die Aufnahme
        self.aufnahme = None;

        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.herunterfahren() {
                warn!("Wiedergabe-Abbau unsauber: {}", e);
            }
        }
    }

    // -----------------------------------------------------------------
    // Eingehende Nachrichten
    // -----------------------------------------------------------------

    /// Verarbeitet eine dekodierte Nachricht des Gespraechsdienstes
    async fn eingehend_verarbeiten(&mut self, nachricht: Eingehend) {
        let Some(engine) = self.engine.as_mut() else {
            trace!("Nachricht ausserhalb eines Gespraechs verworfen");
            return;
        };

        let mut warten_melden = false;
        match nachricht {
            Eingehend::Audio { token, samples } => {
                match engine.einreihen(AudioChunk::neu(token, samples)) {
                    Ok(Some(EntleerErgebnis::WarteAufAudio)) => warten_melden = true,
                    Ok(_) => {}
                    Err(e) => error!("Chunk konnte nicht eingereiht werden: {}", e),
                }
            }
            Eingehend::Token { token } => {
                engine.token_setzen(token);
            }
            Eingehend::Interrupt { token } => {
                debug!(token = %token, "Unterbrechung empfangen");
                if let Err(e) = engine.unterbrechen(token) {
                    error!("Unterbrechung fehlgeschlagen: {}", e);
                }
            }
            Eingehend::Unbekannt { tag } => {
                // Vorwaertskompatibilitaet: unbekannte Typen ignorieren
                trace!(tag, "Unbekannte Nachricht ignoriert");
            }
        }

        if warten_melden {
            self.warten_melden().await;
        }
    }

    // -----------------------------------------------------------------
    // Audio-Ereignisse
    // -----------------------------------------------------------------

    /// Sendet einen Aufnahme-Chunk an den Gespraechsdienst
    async fn chunk_senden(&mut self, samples: Vec<f32>) {
        if self.zustand != SitzungZustand::ImGespraech {
            // Nachzuegler eines bereits beendeten Gespraechs
            return;
        }

        let nachricht =
            Ausgehend::audio_aus_samples(&samples, self.config.gespraech.endianness);
        if let Err(e) = self.verbindung.senden(nachricht).await {
            warn!("Audio-Chunk konnte nicht gesendet werden: {}", e);
        }
    }

    /// Verarbeitet ein Ereignis der Wiedergabeseite
    async fn geraet_ereignis(&mut self, ereignis: GeraetEreignis) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        let GeraetEreignis::ChunkBeendet { ticket } = ereignis;
        match engine.wiedergabe_beendet(ticket) {
            Ok(Some(EntleerErgebnis::WarteAufAudio)) => self.warten_melden().await,
            Ok(_) => {}
            Err(e) => error!("Wiedergabe-Fortsetzung fehlgeschlagen: {}", e),
        }
    }

    /// Meldet dem Dienst, dass kein Audio fuer das aktuelle Token
    /// gepuffert ist
    async fn warten_melden(&mut self) {
        let nachricht = Ausgehend::Zustand {
            zustand: KlientZustand::Warten,
        };
        if let Err(e) = self.verbindung.senden(nachricht).await {
            warn!("Warten-Meldung fehlgeschlagen: {}", e);
        }
    }

    // -----------------------------------------------------------------
    // Sitzungsende
    // -----------------------------------------------------------------

    /// Beendet die Sitzung sauber
    async fn beenden(&mut self) {
        if self.zustand == SitzungZustand::ImGespraech {
            let _ = self.verbindung.senden(Ausgehend::Close).await;
            self.gespraech_abbauen();
            self.zustand = SitzungZustand::Leerlauf;
            let _ = self.meldung_tx.send(SitzungMeldung::GespraechBeendet);
        }
        self.verbindung.schliessen().await;
        info!("Sitzung beendet");
    }
}
