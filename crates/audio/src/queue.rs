//! Wiedergabe-Warteschlange mit Token-Steuerung
//!
//! Eingehende Audio-Chunks werden in Empfangsreihenfolge gepuffert und
//! strikt sequenziell abgespielt: zu jeder Zeit ist genau ein Chunk beim
//! Geraet eingeplant. Chunks, deren Token nicht mehr dem aktuellen Token
//! entspricht, werden beim Entleeren stillschweigend verworfen statt
//! abgespielt – so verschwindet Audio, das unter einem alten Token
//! erzeugt wurde, ohne die Reihenfolge zu stoeren.
//!
//! Die Unterbrechung haelt erst das Geraet an und verwirft erst danach
//! den laufenden Chunk samt Warteschlange. Diese Reihenfolge verhindert,
//! dass das Beendigungs-Ereignis des laufenden Chunks waehrend des
//! Abbaus feuert und das Entleeren mit ungueltigem Zustand erneut
//! anstoesst.

use std::collections::VecDeque;

use plauder_core::Token;
use tracing::{debug, trace};

use crate::error::AudioResult;
use crate::playback::AusgabeGeraet;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// Ein Chunk Synthese-Audio: Token + signierte 16-Bit-Samples
///
/// Unveraenderlich nach Konstruktion; wandert mit Einzelbesitz vom
/// Dekoder ueber die Warteschlange zum Geraet.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Token der Anfrage, die dieses Audio erzeugt hat
    pub token: Token,
    /// Abtastwerte (16-Bit signiert, wiedergabefertig)
    pub samples: Vec<i16>,
}

impl AudioChunk {
    pub fn neu(token: Token, samples: Vec<i16>) -> Self {
        Self { token, samples }
    }

    /// Konvertiert die Samples in normalisierte 32-Bit-Floats
    fn samples_normalisiert(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| s as f32 / 32_768.0).collect()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Zustand der Wiedergabe-Engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineZustand {
    /// Warteschlange leer bzw. kein passender Chunk, nichts eingeplant
    Leerlauf,
    /// Genau ein Chunk ist beim Geraet eingeplant
    Spielt,
}

/// Ergebnis eines Entleerungs-Durchlaufs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntleerErgebnis {
    /// Ein passender Chunk wurde eingeplant
    ChunkGeplant,
    /// Warteschlange erschoepft ohne passenden Chunk – der Dienst soll
    /// erfahren, dass kein Audio fuer das aktuelle Token gepuffert ist
    WarteAufAudio,
}

/// Wiedergabe-Engine: FIFO-Warteschlange mit Token-Filter
///
/// Die Engine ist nicht thread-safe; alle Zugriffe laufen ueber den
/// einen Ereignis-Loop der Sitzung (Serialisierung durch Einzelbesitz,
/// nicht durch Locks).
pub struct WiedergabeEngine<G: AusgabeGeraet> {
    geraet: G,
    warteschlange: VecDeque<AudioChunk>,
    /// Aktuelles Wiedergabe-Token; nur Token- und Interrupt-Nachrichten
    /// aendern es
    aktueller_token: Option<Token>,
    zustand: EngineZustand,
    /// Ticket des aktuell eingeplanten Chunks
    aktives_ticket: Option<u64>,
}

impl<G: AusgabeGeraet> WiedergabeEngine<G> {
    /// Erstellt eine Engine ueber dem gegebenen Ausgabegeraet
    pub fn neu(geraet: G) -> Self {
        Self {
            geraet,
            warteschlange: VecDeque::new(),
            aktueller_token: None,
            zustand: EngineZustand::Leerlauf,
            aktives_ticket: None,
        }
    }

    /// Aktueller Engine-Zustand
    pub fn zustand(&self) -> EngineZustand {
        self.zustand
    }

    /// Aktuelles Wiedergabe-Token
    pub fn aktueller_token(&self) -> Option<Token> {
        self.aktueller_token
    }

    /// Anzahl gepufferter Chunks
    pub fn laenge(&self) -> usize {
        self.warteschlange.len()
    }

    /// Setzt das aktuelle Token. Beruehrt bereits eingeplante Wiedergabe
    /// nicht.
    pub fn token_setzen(&mut self, token: Token) {
        trace!(token = %token, "Token gesetzt");
        self.aktueller_token = Some(token);
    }

    /// Reiht einen Chunk ein (FIFO). Im Leerlauf wird sofort entleert.
    pub fn einreihen(&mut self, chunk: AudioChunk) -> AudioResult<Option<EntleerErgebnis>> {
        self.warteschlange.push_back(chunk);

        if self.zustand == EngineZustand::Leerlauf {
            Ok(Some(self.entleeren()?))
        } else {
            Ok(None)
        }
    }

    /// Entleert die Warteschlange bis zum ersten Chunk mit passendem
    /// Token und plant ihn ein.
    ///
    /// Nicht passende Chunks vor dem Treffer werden verworfen; der Rest
    /// der Warteschlange bleibt unberuehrt. Ist die Warteschlange ohne
    /// Treffer erschoepft, geht die Engine in den Leerlauf und meldet
    /// `WarteAufAudio`.
    pub fn entleeren(&mut self) -> AudioResult<EntleerErgebnis> {
        let passender = loop {
            match self.warteschlange.pop_front() {
                None => break None,
                Some(chunk) if Some(chunk.token) == self.aktueller_token => break Some(chunk),
                Some(chunk) => {
                    debug!(token = %chunk.token, "Veralteten Chunk verworfen");
                }
            }
        };

        match passender {
            None => {
                self.zustand = EngineZustand::Leerlauf;
                self.aktives_ticket = None;
                Ok(EntleerErgebnis::WarteAufAudio)
            }
            Some(chunk) => {
                // Beim Uebergang aus dem Leerlauf das Geraet fortsetzen
                if self.zustand == EngineZustand::Leerlauf {
                    self.geraet.fortsetzen()?;
                }
                let ticket = self.geraet.einplanen(chunk.samples_normalisiert())?;
                self.aktives_ticket = Some(ticket);
                self.zustand = EngineZustand::Spielt;
                Ok(EntleerErgebnis::ChunkGeplant)
            }
        }
    }

    /// Verarbeitet das Ende eines eingeplanten Chunks.
    ///
    /// Veraltete Tickets (nach Abbruch) werden ignoriert. Andernfalls
    /// wird die Warteschlange erneut entleert – als expliziter Aufruf,
    /// nicht als Callback-Rekursion, damit der Ablauf auch in langen
    /// Gespraechen beschraenkt bleibt.
    pub fn wiedergabe_beendet(&mut self, ticket: u64) -> AudioResult<Option<EntleerErgebnis>> {
        if self.aktives_ticket != Some(ticket) {
            trace!(ticket, "Veraltetes Beendigungs-Ereignis ignoriert");
            return Ok(None);
        }
        self.aktives_ticket = None;
        Ok(Some(self.entleeren()?))
    }

    /// Verarbeitet eine Unterbrechung: neues Token setzen, Geraet
    /// anhalten, laufenden Chunk verwerfen, Warteschlange leeren.
    ///
    /// Das Anhalten geschieht vor dem Verwerfen, damit kein
    /// Beendigungs-Ereignis mehr in den Abbau hineinfeuern kann.
    /// Danach gilt: Warteschlange leer, Zustand Leerlauf, kein weiteres
    /// Entleeren bis zum naechsten Einreihen.
    pub fn unterbrechen(&mut self, token: Token) -> AudioResult<()> {
        debug!(token = %token, verworfen = self.warteschlange.len(), "Unterbrechung");
        self.aktueller_token = Some(token);

        self.geraet.anhalten()?;
        self.geraet.abbrechen()?;

        self.aktives_ticket = None;
        self.warteschlange.clear();
        self.zustand = EngineZustand::Leerlauf;
        Ok(())
    }

    /// Faehrt die Engine herunter (Gespraechsende): Geraet anhalten,
    /// laufenden Chunk verwerfen, Warteschlange leeren.
    pub fn herunterfahren(&mut self) -> AudioResult<()> {
        self.geraet.anhalten()?;
        self.geraet.abbrechen()?;
        self.aktives_ticket = None;
        self.warteschlange.clear();
        self.zustand = EngineZustand::Leerlauf;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AudioResult;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Aufzeichnung der Geraete-Aufrufe fuer Reihenfolge-Pruefungen
    #[derive(Debug, Clone, PartialEq)]
    enum Aufruf {
        Einplanen(Vec<f32>),
        Anhalten,
        Fortsetzen,
        Abbrechen,
    }

    /// Deterministisches Mock-Geraet
    struct MockGeraet {
        aufrufe: Rc<RefCell<Vec<Aufruf>>>,
        naechstes_ticket: u64,
    }

    impl MockGeraet {
        fn neu() -> (Self, Rc<RefCell<Vec<Aufruf>>>) {
            let aufrufe = Rc::new(RefCell::new(Vec::new()));
            (
                Self {
                    aufrufe: Rc::clone(&aufrufe),
                    naechstes_ticket: 0,
                },
                aufrufe,
            )
        }
    }

    impl AusgabeGeraet for MockGeraet {
        fn einplanen(&mut self, samples: Vec<f32>) -> AudioResult<u64> {
            self.aufrufe.borrow_mut().push(Aufruf::Einplanen(samples));
            self.naechstes_ticket += 1;
            Ok(self.naechstes_ticket)
        }

        fn anhalten(&mut self) -> AudioResult<()> {
            self.aufrufe.borrow_mut().push(Aufruf::Anhalten);
            Ok(())
        }

        fn fortsetzen(&mut self) -> AudioResult<()> {
            self.aufrufe.borrow_mut().push(Aufruf::Fortsetzen);
            Ok(())
        }

        fn abbrechen(&mut self) -> AudioResult<()> {
            self.aufrufe.borrow_mut().push(Aufruf::Abbrechen);
            Ok(())
        }
    }

    fn token(s: &str) -> Token {
        Token::neu(s).expect("Gueltiges Test-Token")
    }

    fn chunk(t: &str, samples: Vec<i16>) -> AudioChunk {
        AudioChunk::neu(token(t), samples)
    }

    fn engine() -> (WiedergabeEngine<MockGeraet>, Rc<RefCell<Vec<Aufruf>>>) {
        let (geraet, aufrufe) = MockGeraet::neu();
        (WiedergabeEngine::neu(geraet), aufrufe)
    }

    #[test]
    fn einreihen_im_leerlauf_spielt_passenden_chunk() {
        let (mut engine, aufrufe) = engine();
        engine.token_setzen(token("tokenAAA"));

        let ergebnis = engine.einreihen(chunk("tokenAAA", vec![100, -100])).unwrap();
        assert_eq!(ergebnis, Some(EntleerErgebnis::ChunkGeplant));
        assert_eq!(engine.zustand(), EngineZustand::Spielt);

        // Fortsetzen (Leerlauf -> Spielt), dann Einplanen
        let calls = aufrufe.borrow();
        assert_eq!(calls[0], Aufruf::Fortsetzen);
        assert!(matches!(calls[1], Aufruf::Einplanen(_)));
    }

    #[test]
    fn samples_werden_normalisiert() {
        let (mut engine, aufrufe) = engine();
        engine.token_setzen(token("tokenAAA"));
        engine
            .einreihen(chunk("tokenAAA", vec![16_384, -32_768]))
            .unwrap();

        let calls = aufrufe.borrow();
        if let Aufruf::Einplanen(samples) = &calls[1] {
            assert!((samples[0] - 0.5).abs() < 1e-6);
            assert!((samples[1] + 1.0).abs() < 1e-6);
        } else {
            panic!("Erwartet Einplanen-Aufruf");
        }
    }

    #[test]
    fn einreihen_waehrend_wiedergabe_puffert_nur() {
        let (mut engine, aufrufe) = engine();
        engine.token_setzen(token("tokenAAA"));
        engine.einreihen(chunk("tokenAAA", vec![1])).unwrap();

        let ergebnis = engine.einreihen(chunk("tokenAAA", vec![2])).unwrap();
        assert_eq!(ergebnis, None, "Waehrend der Wiedergabe wird nicht entleert");
        assert_eq!(engine.laenge(), 1);
        // Nur der erste Chunk wurde eingeplant
        assert_eq!(
            aufrufe
                .borrow()
                .iter()
                .filter(|a| matches!(a, Aufruf::Einplanen(_)))
                .count(),
            1
        );
    }

    #[test]
    fn entleeren_verwirft_vorangehende_fremde_tokens() {
        // [{A, [100,-100]}, {B, [200]}] bei aktuellem Token B:
        // A wird verworfen, B gespielt, Schlange leer
        let (mut engine, aufrufe) = engine();
        engine.token_setzen(token("tokenBBB"));

        engine.einreihen(chunk("tokenAAA", vec![100, -100])).unwrap();
        // Einreihen von A loest Entleeren aus: A verworfen, WarteAufAudio
        assert_eq!(engine.laenge(), 0);
        assert_eq!(engine.zustand(), EngineZustand::Leerlauf);

        let ergebnis = engine.einreihen(chunk("tokenBBB", vec![200])).unwrap();
        assert_eq!(ergebnis, Some(EntleerErgebnis::ChunkGeplant));
        assert_eq!(engine.laenge(), 0);

        // Genau ein Chunk (B) wurde eingeplant
        let einplanungen: Vec<_> = aufrufe
            .borrow()
            .iter()
            .filter(|a| matches!(a, Aufruf::Einplanen(_)))
            .cloned()
            .collect();
        assert_eq!(einplanungen.len(), 1);
    }

    #[test]
    fn entleeren_spielt_ersten_treffer_und_laesst_rest_unberuehrt() {
        let (mut engine, _aufrufe) = engine();
        engine.token_setzen(token("tokenZZZ"));

        // Gefuellte Schlange waehrend Wiedergabe aufbauen
        engine.einreihen(chunk("tokenZZZ", vec![1])).unwrap(); // spielt
        engine.einreihen(chunk("tokenXXX", vec![2])).unwrap(); // fremd
        engine.einreihen(chunk("tokenZZZ", vec![3])).unwrap(); // Treffer
        engine.einreihen(chunk("tokenZZZ", vec![4])).unwrap(); // bleibt
        assert_eq!(engine.laenge(), 3);

        // Ende des ersten Chunks: fremder wird verworfen, Treffer spielt,
        // der letzte bleibt unkonsumiert
        let ergebnis = engine.wiedergabe_beendet(1).unwrap();
        assert_eq!(ergebnis, Some(EntleerErgebnis::ChunkGeplant));
        assert_eq!(engine.laenge(), 1);
        assert_eq!(engine.zustand(), EngineZustand::Spielt);
    }

    #[test]
    fn erschoepfte_schlange_meldet_warten() {
        let (mut engine, _aufrufe) = engine();
        engine.token_setzen(token("tokenNEU"));

        // Nur fremde Chunks
        let ergebnis = engine.einreihen(chunk("tokenALT", vec![1])).unwrap();
        assert_eq!(ergebnis, Some(EntleerErgebnis::WarteAufAudio));
        assert_eq!(engine.zustand(), EngineZustand::Leerlauf);
        assert_eq!(engine.laenge(), 0);
    }

    #[test]
    fn ohne_token_wird_nichts_gespielt() {
        let (mut engine, aufrufe) = engine();
        let ergebnis = engine.einreihen(chunk("tokenAAA", vec![1])).unwrap();
        assert_eq!(ergebnis, Some(EntleerErgebnis::WarteAufAudio));
        assert!(aufrufe
            .borrow()
            .iter()
            .all(|a| !matches!(a, Aufruf::Einplanen(_))));
    }

    #[test]
    fn sequenzielle_wiedergabe_ueber_beendigung() {
        let (mut engine, aufrufe) = engine();
        engine.token_setzen(token("tokenAAA"));
        engine.einreihen(chunk("tokenAAA", vec![1])).unwrap();
        engine.einreihen(chunk("tokenAAA", vec![2])).unwrap();

        // Erster Chunk fertig -> zweiter wird eingeplant
        let ergebnis = engine.wiedergabe_beendet(1).unwrap();
        assert_eq!(ergebnis, Some(EntleerErgebnis::ChunkGeplant));

        // Zweiter fertig -> Schlange leer, Warten gemeldet
        let ergebnis = engine.wiedergabe_beendet(2).unwrap();
        assert_eq!(ergebnis, Some(EntleerErgebnis::WarteAufAudio));
        assert_eq!(engine.zustand(), EngineZustand::Leerlauf);

        // Fortsetzen nur beim ersten Uebergang aus dem Leerlauf
        assert_eq!(
            aufrufe
                .borrow()
                .iter()
                .filter(|a| matches!(a, Aufruf::Fortsetzen))
                .count(),
            1
        );
    }

    #[test]
    fn token_wechsel_beruehrt_laufende_wiedergabe_nicht() {
        let (mut engine, aufrufe) = engine();
        engine.token_setzen(token("tokenAAA"));
        engine.einreihen(chunk("tokenAAA", vec![1])).unwrap();

        engine.token_setzen(token("tokenBBB"));
        assert_eq!(engine.zustand(), EngineZustand::Spielt);
        assert!(aufrufe
            .borrow()
            .iter()
            .all(|a| !matches!(a, Aufruf::Anhalten | Aufruf::Abbrechen)));
    }

    #[test]
    fn unterbrechung_leert_schlange_und_stoppt() {
        // Interrupt bei [chunk1, chunk2] und laufender Wiedergabe:
        // Schlange leer, kein weiteres Entleeren bis zum naechsten
        // Einreihen
        let (mut engine, aufrufe) = engine();
        engine.token_setzen(token("tokenAAA"));
        engine.einreihen(chunk("tokenAAA", vec![1])).unwrap(); // laeuft
        engine.einreihen(chunk("tokenAAA", vec![2])).unwrap();
        engine.einreihen(chunk("tokenAAA", vec![3])).unwrap();
        assert_eq!(engine.zustand(), EngineZustand::Spielt);
        assert_eq!(engine.laenge(), 2);

        engine.unterbrechen(token("tokenBBB")).unwrap();

        assert_eq!(engine.laenge(), 0, "Schlange muss leer sein");
        assert_eq!(engine.zustand(), EngineZustand::Leerlauf);
        assert_eq!(engine.aktueller_token(), Some(token("tokenBBB")));

        // Kein Einplanen nach der Unterbrechung
        let einplanungen_vorher = aufrufe
            .borrow()
            .iter()
            .filter(|a| matches!(a, Aufruf::Einplanen(_)))
            .count();
        assert_eq!(einplanungen_vorher, 1);
    }

    #[test]
    fn unterbrechung_haelt_erst_an_dann_abbruch() {
        let (mut engine, aufrufe) = engine();
        engine.token_setzen(token("tokenAAA"));
        engine.einreihen(chunk("tokenAAA", vec![1])).unwrap();

        engine.unterbrechen(token("tokenBBB")).unwrap();

        // Anhalten muss vor Abbrechen liegen
        let calls = aufrufe.borrow();
        let pos_anhalten = calls.iter().position(|a| *a == Aufruf::Anhalten).unwrap();
        let pos_abbrechen = calls.iter().position(|a| *a == Aufruf::Abbrechen).unwrap();
        assert!(
            pos_anhalten < pos_abbrechen,
            "Anhalten ({pos_anhalten}) muss vor Abbrechen ({pos_abbrechen}) liegen"
        );
    }

    #[test]
    fn veraltetes_beendigungs_ereignis_nach_unterbrechung_ignoriert() {
        let (mut engine, aufrufe) = engine();
        engine.token_setzen(token("tokenAAA"));
        engine.einreihen(chunk("tokenAAA", vec![1])).unwrap(); // Ticket 1

        engine.unterbrechen(token("tokenBBB")).unwrap();
        let einplanungen_vorher = aufrufe
            .borrow()
            .iter()
            .filter(|a| matches!(a, Aufruf::Einplanen(_)))
            .count();

        // Spaetes Ende des abgebrochenen Chunks
        let ergebnis = engine.wiedergabe_beendet(1).unwrap();
        assert_eq!(ergebnis, None, "Veraltetes Ticket darf nichts ausloesen");
        assert_eq!(engine.zustand(), EngineZustand::Leerlauf);
        assert_eq!(
            aufrufe
                .borrow()
                .iter()
                .filter(|a| matches!(a, Aufruf::Einplanen(_)))
                .count(),
            einplanungen_vorher,
            "Kein weiteres Einplanen nach der Unterbrechung"
        );
    }

    #[test]
    fn nach_unterbrechung_spielt_neues_token() {
        let (mut engine, _aufrufe) = engine();
        engine.token_setzen(token("tokenAAA"));
        engine.einreihen(chunk("tokenAAA", vec![1])).unwrap();
        engine.unterbrechen(token("tokenBBB")).unwrap();

        let ergebnis = engine.einreihen(chunk("tokenBBB", vec![9])).unwrap();
        assert_eq!(ergebnis, Some(EntleerErgebnis::ChunkGeplant));
        assert_eq!(engine.zustand(), EngineZustand::Spielt);
    }

    #[test]
    fn unterbrechung_im_leerlauf_haelt_invariante() {
        let (mut engine, _aufrufe) = engine();
        engine.unterbrechen(token("tokenXYZ")).unwrap();
        assert_eq!(engine.laenge(), 0);
        assert_eq!(engine.zustand(), EngineZustand::Leerlauf);
        assert_eq!(engine.aktueller_token(), Some(token("tokenXYZ")));
    }

    #[test]
    fn herunterfahren_raeumt_auf() {
        let (mut engine, aufrufe) = engine();
        engine.token_setzen(token("tokenAAA"));
        engine.einreihen(chunk("tokenAAA", vec![1])).unwrap();
        engine.einreihen(chunk("tokenAAA", vec![2])).unwrap();

        engine.herunterfahren().unwrap();
        assert_eq!(engine.laenge(), 0);
        assert_eq!(engine.zustand(), EngineZustand::Leerlauf);
        // Token bleibt beim Herunterfahren unveraendert
        assert_eq!(engine.aktueller_token(), Some(token("tokenAAA")));

        let calls = aufrufe.borrow();
        let pos_anhalten = calls.iter().position(|a| *a == Aufruf::Anhalten).unwrap();
        let pos_abbrechen = calls.iter().position(|a| *a == Aufruf::Abbrechen).unwrap();
        assert!(pos_anhalten < pos_abbrechen);
    }

    #[test]
    fn leerer_chunk_wird_eingeplant() {
        // Auch ein Chunk ohne Samples durchlaeuft den normalen Pfad;
        // das Geraet meldet sein Ende unmittelbar
        let (mut engine, _aufrufe) = engine();
        engine.token_setzen(token("tokenAAA"));
        let ergebnis = engine.einreihen(chunk("tokenAAA", vec![])).unwrap();
        assert_eq!(ergebnis, Some(EntleerErgebnis::ChunkGeplant));
    }
}
