// src/logging.rs
//
// Result sinks for the generation loop.
// - GenerationSink: trait used by the optimizer
// - NoopSink:       discards all records
// - CsvSink:        append-only tabular log, one row per approach
// - JsonlSink:      one JSON object per approach row, for tooling
// - MemorySink:     captures records in memory (tests / harnesses)

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::metrics::ApproachMetrics;

/// Log schema version stamped on JSONL rows. The CSV header and this
/// version are fixed before the first write and stable for a run.
pub const LOG_SCHEMA_VERSION: u32 = 1;

/// CSV header. Columns are a stable superset of the delay-only and
/// multi-metric log layouts.
pub const CSV_HEADER: &str = "Generation,Approach,GreenTime,MeanDelay,MaxDelay,MinDelay,\
Throughput,MeanQueue,MaxQueue,Payoff,StrategyChange";

/// One approach's row within a generation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproachRow {
    pub approach: String,
    /// Green seconds the approach ran with this generation.
    pub green_s: u32,
    pub metrics: ApproachMetrics,
    pub payoff: f64,
    /// Total pre-clamp adjustment applied after this generation.
    pub adjustment: i64,
}

/// Append-only log entity: one row set per generation, never mutated
/// after write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: u32,
    pub rows: Vec<ApproachRow>,
}

/// Abstract sink for per-generation results.
pub trait GenerationSink {
    fn log_generation(&mut self, record: &GenerationRecord);
}

/// Sink that discards all records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl GenerationSink for NoopSink {
    fn log_generation(&mut self, _record: &GenerationRecord) {
        // intentionally no-op
    }
}

/// CSV file sink. The header is written at creation so the schema is
/// fixed before the first record.
pub struct CsvSink {
    writer: BufWriter<File>,
}

impl CsvSink {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{CSV_HEADER}")?;
        writer.flush()?;
        Ok(Self { writer })
    }
}

impl GenerationSink for CsvSink {
    fn log_generation(&mut self, record: &GenerationRecord) {
        for row in &record.rows {
            let m = &row.metrics;
            // If logging fails we don't want to crash the run,
            // so we deliberately ignore I/O errors here.
            let _ = writeln!(
                self.writer,
                "{},{},{},{},{},{},{},{},{},{},{}",
                record.generation,
                row.approach,
                row.green_s,
                m.mean_delay_s,
                m.max_delay_s,
                m.min_delay_s,
                m.throughput,
                m.mean_queue,
                m.max_queue,
                row.payoff,
                row.adjustment,
            );
        }
        let _ = self.writer.flush();
    }
}

/// JSONL file sink: one JSON object per approach row, stamped with the
/// log schema version.
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl GenerationSink for JsonlSink {
    fn log_generation(&mut self, record: &GenerationRecord) {
        for row in &record.rows {
            let line = json!({
                "schema_version": LOG_SCHEMA_VERSION,
                "generation": record.generation,
                "approach": row.approach,
                "green_s": row.green_s,
                "mean_delay_s": row.metrics.mean_delay_s,
                "max_delay_s": row.metrics.max_delay_s,
                "min_delay_s": row.metrics.min_delay_s,
                "throughput": row.metrics.throughput,
                "mean_queue": row.metrics.mean_queue,
                "max_queue": row.metrics.max_queue,
                "payoff": row.payoff,
                "adjustment": row.adjustment,
            });
            let _ = writeln!(self.writer, "{line}");
        }
        let _ = self.writer.flush();
    }
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<GenerationRecord>,
}

impl GenerationSink for MemorySink {
    fn log_generation(&mut self, record: &GenerationRecord) {
        self.records.push(record.clone());
    }
}

/// Fan-out: log to every sink in the list.
impl GenerationSink for Vec<Box<dyn GenerationSink>> {
    fn log_generation(&mut self, record: &GenerationRecord) {
        for sink in self.iter_mut() {
            sink.log_generation(record);
        }
    }
}
