//! Parquet sink for captured events
//!
//! Each flush writes one file per event type, named by the flush time down to
//! the nanosecond and a per-writer sequence number. Files are created with
//! `create_new`, so a name collision with an earlier run fails the flush
//! instead of overwriting its data.

use super::{CapturedEvent, EventSink, OrderEvent, TradeEvent};
use crate::replication::Revision;
use arrow::array::{
    Array, ArrayRef, Int32Array, Int64Array, StringArray, TimestampMicrosecondArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn timestamp_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        false,
    )
}

/// Order-log event schema
pub fn order_schema() -> Schema {
    Schema::new(vec![
        timestamp_field("moment"),
        Field::new("revision", DataType::UInt64, false),
        Field::new("session_id", DataType::Int32, false),
        Field::new("isin_id", DataType::Int32, false),
        Field::new("isin", DataType::Utf8, true),
        Field::new("kind", DataType::Utf8, true),
        Field::new("order_id", DataType::Int64, false),
        Field::new("action", DataType::Utf8, false),
        Field::new("side", DataType::Utf8, false),
        Field::new("price", DataType::Utf8, false), // Store as string for Decimal precision
        Field::new("amount", DataType::Int64, false),
        Field::new("amount_rest", DataType::Int64, false),
        Field::new("deal_id", DataType::Int64, true),
    ])
}

/// Trade event schema
pub fn trade_schema() -> Schema {
    Schema::new(vec![
        timestamp_field("moment"),
        Field::new("revision", DataType::UInt64, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new("session_id", DataType::Int32, false),
        Field::new("isin_id", DataType::Int32, false),
        Field::new("isin", DataType::Utf8, true),
        Field::new("deal_id", DataType::Int64, false),
        Field::new("price", DataType::Utf8, false),
        Field::new("amount", DataType::Int64, false),
        Field::new("buy_order_id", DataType::Int64, false),
        Field::new("sell_order_id", DataType::Int64, false),
    ])
}

/// Parquet writer producing one file per event type per flush
pub struct ParquetWriter {
    output_dir: PathBuf,
    sequence: u64,
}

impl ParquetWriter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            sequence: 0,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Ensure output directory exists
    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// File path for a flush at `timestamp` with sequence number `sequence`
    pub fn file_path(&self, prefix: &str, timestamp: DateTime<Utc>, sequence: u64) -> PathBuf {
        let filename = format!(
            "{}_{}_{:06}.parquet",
            prefix,
            timestamp.format("%Y%m%d_%H%M%S_%9f"),
            sequence
        );
        self.output_dir.join(filename)
    }

    fn writer_properties() -> WriterProperties {
        WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build()
    }

    /// Write order events to a Parquet file
    pub fn write_orders(&self, path: &Path, orders: &[&OrderEvent]) -> anyhow::Result<()> {
        if orders.is_empty() {
            return Ok(());
        }

        self.ensure_dir()?;

        let schema = Arc::new(order_schema());
        let file = File::create_new(path)?;
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(Self::writer_properties()))?;

        let moments: Vec<i64> = orders.iter().map(|o| o.moment.timestamp_micros()).collect();
        let prices: Vec<String> = orders.iter().map(|o| o.price.to_string()).collect();

        let columns: Vec<ArrayRef> = vec![
            Arc::new(TimestampMicrosecondArray::from(moments).with_timezone("UTC")),
            Arc::new(UInt64Array::from_iter_values(orders.iter().map(|o| o.revision.0))),
            Arc::new(Int32Array::from_iter_values(orders.iter().map(|o| o.session_id))),
            Arc::new(Int32Array::from_iter_values(orders.iter().map(|o| o.isin_id))),
            Arc::new(StringArray::from(
                orders.iter().map(|o| o.isin.as_deref()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                orders.iter().map(|o| o.kind.map(|k| k.as_str())).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from_iter_values(orders.iter().map(|o| o.order_id))),
            Arc::new(StringArray::from(
                orders.iter().map(|o| o.action.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                orders.iter().map(|o| o.side.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                prices.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from_iter_values(orders.iter().map(|o| o.amount))),
            Arc::new(Int64Array::from_iter_values(orders.iter().map(|o| o.amount_rest))),
            Arc::new(Int64Array::from(
                orders.iter().map(|o| o.deal_id).collect::<Vec<_>>(),
            )),
        ];

        let batch = RecordBatch::try_new(schema, columns)?;
        writer.write(&batch)?;
        writer.close()?;

        tracing::debug!(path = ?path, count = orders.len(), "Wrote orders to Parquet");

        Ok(())
    }

    /// Write trade events to a Parquet file
    pub fn write_trades(&self, path: &Path, trades: &[&TradeEvent]) -> anyhow::Result<()> {
        if trades.is_empty() {
            return Ok(());
        }

        self.ensure_dir()?;

        let schema = Arc::new(trade_schema());
        let file = File::create_new(path)?;
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(Self::writer_properties()))?;

        let moments: Vec<i64> = trades.iter().map(|t| t.moment.timestamp_micros()).collect();
        let prices: Vec<String> = trades.iter().map(|t| t.price.to_string()).collect();

        let columns: Vec<ArrayRef> = vec![
            Arc::new(TimestampMicrosecondArray::from(moments).with_timezone("UTC")),
            Arc::new(UInt64Array::from_iter_values(trades.iter().map(|t| t.revision.0))),
            Arc::new(StringArray::from(
                trades.iter().map(|t| t.kind.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(Int32Array::from_iter_values(trades.iter().map(|t| t.session_id))),
            Arc::new(Int32Array::from_iter_values(trades.iter().map(|t| t.isin_id))),
            Arc::new(StringArray::from(
                trades.iter().map(|t| t.isin.as_deref()).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from_iter_values(trades.iter().map(|t| t.deal_id))),
            Arc::new(StringArray::from(
                prices.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from_iter_values(trades.iter().map(|t| t.amount))),
            Arc::new(Int64Array::from_iter_values(trades.iter().map(|t| t.buy_order_id))),
            Arc::new(Int64Array::from_iter_values(trades.iter().map(|t| t.sell_order_id))),
        ];

        let batch = RecordBatch::try_new(schema, columns)?;
        writer.write(&batch)?;
        writer.close()?;

        tracing::debug!(path = ?path, count = trades.len(), "Wrote trades to Parquet");

        Ok(())
    }
}

/// Event sink writing each flushed batch to Parquet
pub struct ParquetSink {
    writer: ParquetWriter,
}

impl ParquetSink {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            writer: ParquetWriter::new(output_dir),
        }
    }
}

#[async_trait]
impl EventSink for ParquetSink {
    async fn write(&mut self, events: &[CapturedEvent]) -> anyhow::Result<()> {
        let mut orders = Vec::new();
        let mut trades = Vec::new();
        for event in events {
            match event {
                CapturedEvent::Order(order) => orders.push(order),
                CapturedEvent::Trade(trade) => trades.push(trade),
            }
        }

        let now = Utc::now();
        let sequence = self.writer.sequence;
        self.writer.sequence += 1;

        self.writer
            .write_orders(&self.writer.file_path("orders", now, sequence), &orders)?;
        self.writer
            .write_trades(&self.writer.file_path("trades", now, sequence), &trades)?;

        Ok(())
    }
}

/// Trade row as read back from Parquet
#[derive(Debug, Clone)]
pub struct TradeRow {
    pub moment: DateTime<Utc>,
    pub revision: Revision,
    pub kind: String,
    pub isin_id: i32,
    pub isin: Option<String>,
    pub deal_id: i64,
    pub price: Decimal,
    pub amount: i64,
}

/// Reader for Parquet files
pub struct ParquetReader {
    path: PathBuf,
}

impl ParquetReader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read trades from a Parquet file
    pub fn read_trades(&self) -> anyhow::Result<Vec<TradeRow>> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
        use std::str::FromStr;

        let file = File::open(&self.path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut trades = Vec::new();

        for batch_result in reader {
            let batch = batch_result?;

            let moments = column::<TimestampMicrosecondArray>(&batch, "moment")?;
            let revisions = column::<UInt64Array>(&batch, "revision")?;
            let kinds = column::<StringArray>(&batch, "kind")?;
            let isin_ids = column::<Int32Array>(&batch, "isin_id")?;
            let isins = column::<StringArray>(&batch, "isin")?;
            let deal_ids = column::<Int64Array>(&batch, "deal_id")?;
            let prices = column::<StringArray>(&batch, "price")?;
            let amounts = column::<Int64Array>(&batch, "amount")?;

            for i in 0..batch.num_rows() {
                let moment = DateTime::from_timestamp_micros(moments.value(i))
                    .ok_or_else(|| anyhow::anyhow!("Invalid moment"))?;

                trades.push(TradeRow {
                    moment,
                    revision: Revision(revisions.value(i)),
                    kind: kinds.value(i).to_string(),
                    isin_id: isin_ids.value(i),
                    isin: (!isins.is_null(i)).then(|| isins.value(i).to_string()),
                    deal_id: deal_ids.value(i),
                    price: Decimal::from_str(prices.value(i))?,
                    amount: amounts.value(i),
                });
            }
        }

        Ok(trades)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow::anyhow!("Invalid {} column", name))
}
