//! DSP-Bausteine fuer die Aufnahme-Pipeline
//!
//! Realisiert die drei Aufnahme-Optionen des Gespraechskanals – Echo-
//! Daempfung, Rauschunterdrueckung und automatische Pegelregelung – als
//! Prozessor-Kette. Alle Bausteine verarbeiten Samples in-place im
//! cpal-Callback; sie muessen daher ohne Locks im Hot Path auskommen
//! (die Echo-Referenz verwendet `try_lock` und ueberspringt den Frame,
//! falls die Wiedergabeseite gerade schreibt).

use std::sync::Arc;

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Prozessor-Trait und Pipeline
// ---------------------------------------------------------------------------

/// Gemeinsames Trait fuer alle Audio-Prozessoren
///
/// Alle DSP-Bausteine verarbeiten Samples in-place und sind Send fuer
/// die Nutzung im Capture-Callback-Thread.
pub trait AudioProcessor: Send {
    /// Verarbeitet einen Puffer von Samples in-place
    fn process(&mut self, samples: &mut [f32]);

    /// Setzt den internen Zustand zurueck (z.B. Pegel-Historie)
    fn reset(&mut self);
}

/// Aufnahme-Pipeline: wendet eine Prozessor-Kette sequenziell an
pub struct AufnahmePipeline {
    prozessoren: Vec<Box<dyn AudioProcessor>>,
}

impl AufnahmePipeline {
    /// Erstellt eine Pipeline mit der gegebenen Prozessor-Kette
    pub fn neu(prozessoren: Vec<Box<dyn AudioProcessor>>) -> Self {
        Self { prozessoren }
    }

    /// Leere Pipeline ohne Prozessoren
    pub fn leer() -> Self {
        Self::neu(Vec::new())
    }

    /// Verarbeitet einen Frame durch die gesamte Kette
    pub fn verarbeiten(&mut self, samples: &mut [f32]) {
        for prozessor in self.prozessoren.iter_mut() {
            prozessor.process(samples);
        }
    }

    /// Anzahl der Prozessoren in der Kette
    pub fn laenge(&self) -> usize {
        self.prozessoren.len()
    }
}

/// Konfiguration der Aufnahme-DSP-Kette
#[derive(Debug, Clone)]
pub struct DspConfig {
    /// Echo-Daempfung aktivieren
    pub echo_daempfung: bool,
    /// Rauschunterdrueckung aktivieren
    pub rauschunterdrueckung: bool,
    /// Automatische Pegelregelung aktivieren
    pub pegelregelung: bool,
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            echo_daempfung: true,
            rauschunterdrueckung: true,
            pegelregelung: true,
        }
    }
}

/// Baut die Standard-Aufnahme-Pipeline: Echo -> Rauschen -> Pegel
///
/// Die Echo-Daempfung wird nur eingehaengt wenn eine Referenz der
/// Wiedergabeseite vorliegt.
pub fn standard_pipeline(
    config: &DspConfig,
    echo_referenz: Option<GeteilteEchoReferenz>,
) -> AufnahmePipeline {
    let mut kette: Vec<Box<dyn AudioProcessor>> = Vec::new();

    if config.echo_daempfung {
        if let Some(referenz) = echo_referenz {
            kette.push(Box::new(EchoDaempfer::neu(referenz)));
        }
    }
    if config.rauschunterdrueckung {
        kette.push(Box::new(Rauschunterdrueckung::neu()));
    }
    if config.pegelregelung {
        kette.push(Box::new(Pegelregler::neu()));
    }

    AufnahmePipeline::neu(kette)
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let quadratsumme: f32 = samples.iter().map(|s| s * s).sum();
    (quadratsumme / samples.len() as f32).sqrt()
}

// ---------------------------------------------------------------------------
// Echo-Daempfung
// ---------------------------------------------------------------------------

/// Pegel-Referenz der Wiedergabeseite
///
/// Der Wiedergabe-Callback speist seine Samples ein; gehalten wird nur
/// ein geglaetteter Energie-Pegel, kein Sample-Puffer. Dadurch ist die
/// Referenz unabhaengig von den unterschiedlichen Abtastraten der
/// beiden Streams (16 kHz Aufnahme, 44,1 kHz Wiedergabe).
pub struct EchoReferenz {
    energie: f32,
    glaettung: f32,
}

impl EchoReferenz {
    pub fn neu() -> Self {
        Self {
            energie: 0.0,
            glaettung: 0.85,
        }
    }

    /// Speist einen Frame der Wiedergabeseite ein
    pub fn einspeisen(&mut self, samples: &[f32]) {
        let frame_rms = rms(samples);
        self.energie = self.glaettung * self.energie + (1.0 - self.glaettung) * frame_rms;
    }

    /// Aktueller geglaetteter Wiedergabe-Pegel
    pub fn pegel(&self) -> f32 {
        self.energie
    }
}

impl Default for EchoReferenz {
    fn default() -> Self {
        Self::neu()
    }
}

/// Thread-uebergreifend geteilte Echo-Referenz
pub type GeteilteEchoReferenz = Arc<Mutex<EchoReferenz>>;

/// Erstellt eine neue geteilte Echo-Referenz
pub fn echo_referenz_neu() -> GeteilteEchoReferenz {
    Arc::new(Mutex::new(EchoReferenz::neu()))
}

/// Vereinfachte Echo-Daempfung (Halb-Duplex-Ansatz)
///
/// Echte adaptive Echo-Kompensation (wie WebRTC-AEC) ist extrem komplex.
/// Diese Implementierung daempft das Mikrofonsignal waehrend der
/// Lautsprecher aktiv ist, statt das Echo zu subtrahieren.
pub struct EchoDaempfer {
    referenz: GeteilteEchoReferenz,
    /// Wiedergabe-Pegel ab dem gedaempft wird
    schwelle: f32,
    /// Rest-Verstaerkung waehrend der Daempfung (0.0..1.0)
    rest_verstaerkung: f32,
    /// Geglaettete aktuelle Verstaerkung
    verstaerkung: f32,
    /// Glaettungsfaktor pro Frame
    glaettung: f32,
}

impl EchoDaempfer {
    pub fn neu(referenz: GeteilteEchoReferenz) -> Self {
        Self {
            referenz,
            schwelle: 0.01,
            rest_verstaerkung: 0.25,
            verstaerkung: 1.0,
            glaettung: 0.6,
        }
    }

    /// Aktuelle Daempfungs-Verstaerkung (fuer Diagnose)
    pub fn verstaerkung(&self) -> f32 {
        self.verstaerkung
    }
}

impl AudioProcessor for EchoDaempfer {
    fn process(&mut self, samples: &mut [f32]) {
        // Referenz nicht blockierend lesen; ist die Wiedergabeseite
        // gerade aktiv, bleibt der alte Pegel in Kraft
        let wiedergabe_pegel = match self.referenz.try_lock() {
            Some(referenz) => referenz.pegel(),
            None => return,
        };

        let ziel = if wiedergabe_pegel > self.schwelle {
            self.rest_verstaerkung
        } else {
            1.0
        };
        self.verstaerkung = self.glaettung * self.verstaerkung + (1.0 - self.glaettung) * ziel;

        for sample in samples.iter_mut() {
            *sample *= self.verstaerkung;
        }
    }

    fn reset(&mut self) {
        self.verstaerkung = 1.0;
    }
}

// ---------------------------------------------------------------------------
// Rauschunterdrueckung
// ---------------------------------------------------------------------------

/// Rauschunterdrueckung ueber Grundrausch-Schaetzung
///
/// Der Rauschpegel wird waehrend stiller Frames per exponentieller
/// Glaettung gelernt. Frames nahe am Grundrauschen werden abgesenkt,
/// Sprachframes passieren unveraendert (mit einem Gain-Boden gegen
/// Pump-Artefakte).
pub struct Rauschunterdrueckung {
    /// Geschaetzter Rauschpegel (RMS)
    rausch_pegel: f32,
    /// Glaettungsfaktor fuer die Rauschschaetzung
    glaettung: f32,
    /// RMS-Wert unterhalb dessen ein Frame als Rauschen gilt
    stille_schwelle: f32,
    /// Minimale Verstaerkung nach Absenkung
    boden: f32,
}

impl Rauschunterdrueckung {
    pub fn neu() -> Self {
        Self {
            rausch_pegel: 0.0,
            glaettung: 0.95,
            stille_schwelle: 0.02,
            boden: 0.1,
        }
    }

    /// Aktuelle Rauschschaetzung (fuer Diagnose)
    pub fn rausch_pegel(&self) -> f32 {
        self.rausch_pegel
    }
}

impl Default for Rauschunterdrueckung {
    fn default() -> Self {
        Self::neu()
    }
}

impl AudioProcessor for Rauschunterdrueckung {
    fn process(&mut self, samples: &mut [f32]) {
        let frame_rms = rms(samples);

        // Rauschschaetzung nur waehrend Stille aktualisieren
        if frame_rms < self.stille_schwelle {
            self.rausch_pegel =
                self.glaettung * self.rausch_pegel + (1.0 - self.glaettung) * frame_rms;
        }

        if self.rausch_pegel < 1e-7 {
            return;
        }

        // Frames nahe am Grundrauschen absenken; Abstand zum Rauschen
        // bestimmt die Verstaerkung
        let abstand = if frame_rms > 1e-7 {
            self.rausch_pegel / frame_rms
        } else {
            1.0
        };
        let verstaerkung = (1.0 - 2.0 * abstand).max(self.boden).min(1.0);

        for sample in samples.iter_mut() {
            *sample *= verstaerkung;
        }
    }

    fn reset(&mut self) {
        self.rausch_pegel = 0.0;
    }
}

// ---------------------------------------------------------------------------
// Pegelregelung
// ---------------------------------------------------------------------------

/// Automatische Pegelregelung mit Limiter
///
/// Regelt pro Frame auf einen Ziel-RMS-Pegel. Die Verstaerkung sinkt
/// schnell (Attack) und steigt langsam (Release), damit Pegelspitzen
/// nicht pumpen und Stille nicht aufgeblasen wird.
pub struct Pegelregler {
    /// Ziel-RMS-Pegel (ca. -20 dBFS)
    ziel_pegel: f32,
    /// Maximale Verstaerkung
    max_verstaerkung: f32,
    /// Minimale Verstaerkung
    min_verstaerkung: f32,
    /// Glaettung beim Absenken der Verstaerkung (pro Frame)
    attack: f32,
    /// Glaettung beim Anheben der Verstaerkung (pro Frame)
    release: f32,
    /// Limiter-Schwellenwert (Hard Clip)
    limiter: f32,
    /// Aktuelle geglaettete Verstaerkung
    verstaerkung: f32,
}

impl Pegelregler {
    pub fn neu() -> Self {
        Self {
            ziel_pegel: 0.1,
            max_verstaerkung: 16.0,
            min_verstaerkung: 0.25,
            attack: 0.2,
            release: 0.9,
            limiter: 0.95,
            verstaerkung: 1.0,
        }
    }

    /// Aktuelle Verstaerkung (fuer Diagnose)
    pub fn verstaerkung(&self) -> f32 {
        self.verstaerkung
    }
}

impl Default for Pegelregler {
    fn default() -> Self {
        Self::neu()
    }
}

impl AudioProcessor for Pegelregler {
    fn process(&mut self, samples: &mut [f32]) {
        let frame_rms = rms(samples);

        // Stille nicht aufblasen: Verstaerkung halten
        let ziel = if frame_rms > 1e-4 {
            (self.ziel_pegel / frame_rms).clamp(self.min_verstaerkung, self.max_verstaerkung)
        } else {
            self.verstaerkung
        };

        // Schnell runter, langsam hoch
        let glaettung = if ziel < self.verstaerkung {
            self.attack
        } else {
            self.release
        };
        self.verstaerkung = glaettung * self.verstaerkung + (1.0 - glaettung) * ziel;

        for sample in samples.iter_mut() {
            *sample = (*sample * self.verstaerkung).clamp(-self.limiter, self.limiter);
        }
    }

    fn reset(&mut self) {
        self.verstaerkung = 1.0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
