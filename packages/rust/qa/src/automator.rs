//! Row-by-row Q&A pipeline: worksheet → model → worksheet.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use chorekit_sheets::Workbook;
use chorekit_shared::{ChoreError, ProgressReporter, QaConfig, QuestionRow, Result};

use crate::client::ModelClient;

/// Where questions and answers live in the workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaLayout {
    /// Worksheet index (0-based).
    pub sheet: usize,
    /// 1-based column of the questions.
    pub question_column: u32,
    /// 1-based column receiving the answers.
    pub answer_column: u32,
    /// First data row (1-based).
    pub first_row: u32,
}

impl From<&QaConfig> for QaLayout {
    fn from(config: &QaConfig) -> Self {
        Self {
            sheet: config.sheet,
            question_column: config.question_column,
            answer_column: config.answer_column,
            first_row: config.first_row,
        }
    }
}

impl QaLayout {
    fn validate(&self) -> Result<()> {
        if self.question_column == 0 || self.answer_column == 0 || self.first_row == 0 {
            return Err(ChoreError::config("columns and rows are 1-based"));
        }
        if self.question_column == self.answer_column {
            return Err(ChoreError::config(
                "answer column must differ from the question column",
            ));
        }
        Ok(())
    }
}

/// Outcome of a Q&A run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QaSummary {
    /// Rows that received a new answer.
    pub answered: usize,
    /// Rows whose existing answer was left alone.
    pub preserved: usize,
    /// Rows without a question.
    pub skipped_empty: usize,
    /// Rows whose request failed; left untouched.
    pub failed: usize,
    /// Where the workbook was written.
    pub saved_to: PathBuf,
}

/// Read every data row of the question column.
pub fn read_questions(book: &Workbook, layout: &QaLayout) -> Result<Vec<QuestionRow>> {
    let last_row = book.last_row(layout.sheet)?;
    let mut rows = Vec::new();

    for row in layout.first_row..=last_row {
        rows.push(QuestionRow {
            row,
            question: book
                .text(layout.sheet, layout.question_column, row)?
                .unwrap_or_default(),
            answer: book.text(layout.sheet, layout.answer_column, row)?,
        });
    }

    Ok(rows)
}

/// Answer every open question of the workbook at `path`.
///
/// The model endpoint is checked first; an unreachable endpoint aborts the
/// run before the workbook is opened. Rows with an existing answer are never
/// overwritten. A failing request is logged and its row skipped; the run
/// continues. The workbook is saved to `out`, or back to `path` when `out`
/// is `None`.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn run_qa(
    path: &Path,
    out: Option<&Path>,
    layout: &QaLayout,
    client: &dyn ModelClient,
    progress: &dyn ProgressReporter,
) -> Result<QaSummary> {
    layout.validate()?;
    client.preflight().await?;

    progress.phase("Reading questions");
    let mut book = Workbook::open(path)?;
    let rows = read_questions(&book, layout)?;
    let total = rows.len();

    info!(
        rows = total,
        question_column = layout.question_column,
        answer_column = layout.answer_column,
        "starting Q&A run"
    );

    let mut summary = QaSummary::default();
    progress.phase("Asking questions");

    for (i, row) in rows.iter().enumerate() {
        if row.question.is_empty() {
            summary.skipped_empty += 1;
            continue;
        }
        if !row.needs_answer() {
            summary.preserved += 1;
            continue;
        }

        progress.item(&row.question, i + 1, total);

        match client.answer(&row.question).await {
            Ok(answer) => {
                book.set_text(layout.sheet, layout.answer_column, row.row, &answer)?;
                info!(row = row.row, chars = answer.len(), "answer written");
                summary.answered += 1;
            }
            Err(e) => {
                warn!(row = row.row, error = %e, "question failed, row skipped");
                summary.failed += 1;
            }
        }
    }

    let target = out.unwrap_or(path);
    book.save_as(target)?;
    summary.saved_to = target.to_path_buf();
    progress.done();

    info!(
        answered = summary.answered,
        preserved = summary.preserved,
        failed = summary.failed,
        saved_to = %target.display(),
        "Q&A run completed"
    );

    Ok(summary)
}
