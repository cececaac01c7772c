use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Date32Array, Int64Array, StringArray, UInt32Array, UInt8Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, Duration, NaiveDate};
use parquet::arrow::ArrowWriter;
use serde::Serialize;

const USERS: u64 = 5_000;

/// `NaiveDate::num_days_from_ce` of 1970-01-01, the Arrow `Date32` origin.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Device mix with a base adoption probability each.
const DEVICES: [(&str, f64, f64); 3] = [
    ("mobile", 0.55, 0.48),
    ("desktop", 0.35, 0.62),
    ("tablet", 0.10, 0.40),
];

/// Channel mix with an adoption multiplier each.
const CHANNELS: [(&str, f64, f64); 4] = [
    ("organic", 0.40, 1.10),
    ("email", 0.25, 1.25),
    ("ads", 0.25, 0.75),
    ("referral", 0.10, 1.15),
];

#[derive(Debug, Serialize)]
struct Row {
    user_id: u64,
    device_type: &'static str,
    channel: &'static str,
    signup_date: NaiveDate,
    feature_adopted: u8,
    feature_used_times: u32,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Pick from `(label, weight, ..)` entries whose weights sum to 1.
    fn pick<'a, const N: usize>(
        &mut self,
        table: &'a [(&'static str, f64, f64); N],
    ) -> &'a (&'static str, f64, f64) {
        let mut roll = self.next_f64();
        for entry in table {
            if roll < entry.1 {
                return entry;
            }
            roll -= entry.1;
        }
        &table[N - 1]
    }

    /// Geometric-ish use count with the given mean, at least 1.
    fn uses(&mut self, mean: f64) -> u32 {
        let u = self.next_f64().max(1e-15);
        (1.0 - mean * u.ln()).floor().min(200.0) as u32
    }
}

fn generate(rng: &mut SimpleRng, start: NaiveDate) -> Vec<Row> {
    (1..=USERS)
        .map(|user_id| {
            let &(device_type, _, base) = rng.pick(&DEVICES);
            let &(channel, _, lift) = rng.pick(&CHANNELS);
            let signup_date = start + Duration::days((rng.next_u64() % 365) as i64);
            let adopted = rng.next_f64() < (base * lift).min(0.95);
            let feature_used_times = if adopted { rng.uses(4.0) } else { 0 };

            Row {
                user_id,
                device_type,
                channel,
                signup_date,
                feature_adopted: u8::from(adopted),
                feature_used_times,
            }
        })
        .collect()
}

fn write_csv(path: &Path, rows: &[Row]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV file")?;
    for row in rows {
        writer.serialize(row).context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV file")?;
    Ok(())
}

fn write_parquet(path: &Path, rows: &[Row]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("user_id", DataType::Int64, false),
        Field::new("device_type", DataType::Utf8, false),
        Field::new("channel", DataType::Utf8, false),
        Field::new("signup_date", DataType::Date32, false),
        Field::new("feature_adopted", DataType::UInt8, false),
        Field::new("feature_used_times", DataType::UInt32, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.user_id as i64))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.device_type))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.channel))),
            Arc::new(Date32Array::from_iter_values(
                rows.iter().map(|r| r.signup_date.num_days_from_ce() - EPOCH_DAYS_FROM_CE),
            )),
            Arc::new(UInt8Array::from_iter_values(rows.iter().map(|r| r.feature_adopted))),
            Arc::new(UInt32Array::from_iter_values(rows.iter().map(|r| r.feature_used_times))),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).context("creating output file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating Parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing Parquet writer")?;
    Ok(())
}

fn main() -> Result<()> {
    let output_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "feature_adoption_dataset.csv".to_string());
    let path = Path::new(&output_path);

    let start = NaiveDate::from_ymd_opt(2024, 1, 1).context("invalid start date")?;
    let mut rng = SimpleRng::new(42);
    let rows = generate(&mut rng, start);

    match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") | Some("pq") => write_parquet(path, &rows)?,
        _ => write_csv(path, &rows)?,
    }

    let adopted = rows.iter().filter(|r| r.feature_adopted == 1).count();
    println!(
        "Wrote {} users ({adopted} adopters) to {output_path}",
        rows.len()
    );
    Ok(())
}
