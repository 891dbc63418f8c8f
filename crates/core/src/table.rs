use crate::error::{RagError, Result};
use crate::models::ChatMessage;
use crate::traits::{GenerationService, TabularAgentService};
use async_trait::async_trait;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_PREVIEW_ROWS: usize = 50;

const TABLE_SYSTEM_PROMPT: &str = "You are a data analyst. Answer the question using only the table \
below. Show the computation you performed in one or two sentences. If the table does not \
hold the information needed, say so clearly.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub non_empty: usize,
    pub numeric: Option<NumericSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != headers.len())
        {
            return Err(RagError::InvalidArgument(format!(
                "row {index} has {} cells but the table has {} columns",
                row.len(),
                headers.len()
            )));
        }
        Ok(Self { headers, rows })
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let reader = csv::Reader::from_path(path)?;
        Self::from_csv(reader)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Self::from_csv(csv::Reader::from_reader(reader))
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let headers = reader.headers()?.iter().map(String::from).collect();
        let rows = reader
            .records()
            .map(|record| record.map(|record| record.iter().map(String::from).collect()))
            .collect::<Result<Vec<Vec<String>>, csv::Error>>()?;
        Ok(Self { headers, rows })
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Cells of `name` that parse as numbers, with their row positions.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<(usize, f64)>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| RagError::InvalidArgument(format!("unknown column {name}")))?;
        Ok(self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(row, cells)| {
                let value = cells.get(index)?.trim().parse::<f64>().ok()?;
                Some((row, value))
            })
            .collect())
    }

    pub fn describe(&self) -> Vec<ColumnSummary> {
        self.headers
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let cells: Vec<&str> = self
                    .rows
                    .iter()
                    .filter_map(|row| row.get(index).map(|cell| cell.trim()))
                    .filter(|cell| !cell.is_empty())
                    .collect();
                let numbers: Vec<f64> = cells.iter().filter_map(|cell| cell.parse().ok()).collect();
                let numeric = (!numbers.is_empty() && numbers.len() == cells.len()).then(|| {
                    NumericSummary {
                        min: numbers.iter().copied().fold(f64::INFINITY, f64::min),
                        max: numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                        mean: numbers.iter().sum::<f64>() / numbers.len() as f64,
                    }
                });
                ColumnSummary {
                    name: name.clone(),
                    non_empty: cells.len(),
                    numeric,
                }
            })
            .collect()
    }

    pub fn to_csv_string(&self, max_rows: usize) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in self.rows.iter().take(max_rows) {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|error| RagError::Io(error.into_error()))?;
        String::from_utf8(bytes)
            .map_err(|error| RagError::InvalidArgument(format!("table is not utf-8: {error}")))
    }
}

/// Answers table questions with one generation request that carries the
/// schema, a summary and the first rows as CSV.
pub struct LlmTableAgent {
    generator: Arc<dyn GenerationService>,
    preview_rows: usize,
}

impl LlmTableAgent {
    pub fn new(generator: Arc<dyn GenerationService>) -> Self {
        Self {
            generator,
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }

    pub fn with_preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows.max(1);
        self
    }

    pub fn build_messages(&self, table: &Table, question: &str) -> Result<Vec<ChatMessage>> {
        let summary = table
            .describe()
            .iter()
            .map(|column| match column.numeric {
                Some(stats) => format!(
                    "- {}: numeric, {} values, min {}, max {}, mean {:.4}",
                    column.name, column.non_empty, stats.min, stats.max, stats.mean
                ),
                None => format!("- {}: text, {} values", column.name, column.non_empty),
            })
            .collect::<Vec<_>>()
            .join("\n");

        let shown = table.row_count().min(self.preview_rows);
        let context = format!(
            "{TABLE_SYSTEM_PROMPT}\n\nThe table has {} rows and {} columns.\n\
             Columns:\n{summary}\n\nFirst {shown} rows as CSV:\n{}",
            table.row_count(),
            table.column_count(),
            table.to_csv_string(self.preview_rows)?
        );

        Ok(vec![ChatMessage::system(context), ChatMessage::user(question)])
    }
}

#[async_trait]
impl TabularAgentService for LlmTableAgent {
    async fn ask(&self, table: &Table, question: &str) -> Result<String> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidArgument("question is empty".to_string()));
        }
        let messages = self.build_messages(table, question)?;
        let answer = self.generator.generate(&messages).await?;
        info!(
            rows = table.row_count(),
            columns = table.column_count(),
            generator = self.generator.name(),
            "answered table question"
        );
        Ok(answer)
    }
}
