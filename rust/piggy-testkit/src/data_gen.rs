//! Synthetic document generation.
//!
//! All generators are deterministic for a given seed.

use std::io::{Seek, SeekFrom, Write};

use piggy_index::{Document, Field};

const WORDS: &[&str] = &[
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india",
    "juliett", "kilo", "lima", "mike", "november", "oscar", "papa", "quebec", "romeo",
    "sierra", "tango", "uniform", "victor", "whiskey", "xray", "yankee", "zulu", "ünïcödé",
    "日本語", "emoji😀",
];

const DAY_MS: i64 = 86_400_000;

/// Generates documents with a fixed set of fields of every stored type.
///
/// Fields: `id` (long), `title` (string), `body` (string, a few words to a few
/// hundred), `rank` (int), `score` (double), `ratio` (float), `created` (timestamp in
/// milliseconds, often a whole number of seconds or days), `payload` (binary,
/// sometimes absent) and `tag` (string, not stored).
pub struct DocumentGenerator {
    rng: fastrand::Rng,
    next_id: i64,
}

impl DocumentGenerator {
    pub fn new(seed: u64) -> DocumentGenerator {
        DocumentGenerator {
            rng: fastrand::Rng::with_seed(seed),
            next_id: 0,
        }
    }

    fn words(&mut self, count: usize) -> String {
        (0..count)
            .map(|_| WORDS[self.rng.usize(..WORDS.len())])
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn timestamp(&mut self) -> i64 {
        let base = 19_000 * DAY_MS;
        match self.rng.u8(0..4) {
            0 => base + self.rng.i64(0..1000) * DAY_MS,
            1 => base + self.rng.i64(0..10_000_000) * 1000,
            _ => base + self.rng.i64(0..DAY_MS * 1000),
        }
    }

    pub fn next_document(&mut self) -> Document {
        let id = self.next_id;
        self.next_id += 1;

        let title_len = self.rng.usize(1..6);
        let body_len = match self.rng.u8(0..10) {
            0 => self.rng.usize(100..400),
            _ => self.rng.usize(0..30),
        };
        let mut doc = Document::new()
            .with(Field::numeric("id", id))
            .with(Field::text("title", self.words(title_len)))
            .with(Field::text("body", self.words(body_len)))
            .with(Field::numeric("rank", self.rng.i32(-1000..1000)))
            .with(Field::numeric("score", self.rng.f64() * 1000.0 - 500.0))
            .with(Field::numeric("ratio", self.rng.u8(0..100) as f32 / 4.0))
            .with(Field::numeric("created", self.timestamp()));
        if self.rng.bool() {
            let len = self.rng.usize(0..64);
            let payload = (0..len).map(|_| self.rng.u8(..)).collect::<Vec<_>>();
            doc.add(Field::binary("payload", payload));
        }
        doc.add(Field::text("tag", self.words(1)).not_stored());
        doc
    }

    pub fn documents(&mut self, count: usize) -> Vec<Document> {
        (0..count).map(|_| self.next_document()).collect()
    }
}

/// Generates `count` flat JSON objects, one per line, and returns them as a
/// temporary file positioned at the start.
pub fn generate_ndjson(count: usize, seed: u64) -> anyhow::Result<tempfile::NamedTempFile> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut file = tempfile::NamedTempFile::new()?;
    for i in 0..count {
        let mut obj = serde_json::Map::new();
        obj.insert("id".into(), serde_json::Value::from(i as u64));
        obj.insert(
            "name".into(),
            serde_json::Value::from(WORDS[rng.usize(..WORDS.len())]),
        );
        obj.insert("big".into(), serde_json::Value::from(rng.i64(..)));
        obj.insert("score".into(), serde_json::Value::from(rng.f64()));
        obj.insert("active".into(), serde_json::Value::from(rng.bool()));
        if rng.bool() {
            obj.insert(
                "tags".into(),
                serde_json::Value::from(vec![WORDS[rng.usize(..WORDS.len())]]),
            );
        }
        obj.insert("missing".into(), serde_json::Value::Null);
        serde_json::to_writer(&mut file, &obj)?;
        file.write_all(b"\n")?;
    }
    file.flush()?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}
