//! Append-only xlsx output store.
//!
//! xlsx is a zip archive, so adding a row means writing the whole workbook
//! again. On open the store loads every worksheet with its typed values and
//! formulas; each [`OutputStore::append`] writes all of them back plus the
//! new row to a temporary file next to the target and renames it into place.
//! Other sheets, numbers, booleans, dates and formulas survive the rewrite and
//! a failed write leaves the previous file untouched. Cell styling other than
//! date and duration formats is not carried over.

use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, SheetType, SheetVisible, Xlsx, open_workbook};
use rust_xlsxwriter::{Format, Formula, Workbook, Worksheet};
use thiserror::Error;

use crate::sanitize::{is_illegal_cell_char, sanitize};

pub const SHEET_NAME: &str = "Sheet1";
pub const HEADER: [&str; 2] = ["Text", "Category"];
/// Longest string an xlsx cell may hold.
pub const MAX_CELL_CHARS: usize = 32_767;

const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";
const DURATION_FORMAT: &str = "[h]:mm:ss";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cell contains illegal character U+{code:04X}")]
    IllegalCharacter { code: u32 },
    #[error("cell holds {chars} characters, more than the xlsx limit of {max}", max = MAX_CELL_CHARS)]
    CellTooLong { chars: usize },
    #[error("{} has no sheet named {}", .path.display(), SHEET_NAME)]
    MissingSheet { path: PathBuf },
    #[error("{} contains sheet {name:?} that cannot be rewritten ({kind})", .path.display())]
    UnsupportedSheet {
        path: PathBuf,
        name: String,
        kind: String,
    },
    #[error("failed to read workbook: {0}")]
    Read(#[from] calamine::XlsxError),
    #[error("failed to write workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),
    #[error("failed to replace output file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Errors caused by one row's content. The row is skipped and the store
    /// stays usable.
    pub fn is_row_rejection(&self) -> bool {
        matches!(
            self,
            StoreError::IllegalCharacter { .. } | StoreError::CellTooLong { .. }
        )
    }
}

/// One output row: sanitized text and its category label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    pub text: String,
    pub category: String,
}

impl AnnotationRecord {
    /// Build a record with both fields sanitized.
    pub fn new(text: &str, category: &str) -> Self {
        Self {
            text: sanitize(text).into_owned(),
            category: sanitize(category).into_owned(),
        }
    }
}

/// A cell as loaded from disk: its cached value and, for formula cells, the
/// formula text.
#[derive(Debug, Clone, PartialEq)]
struct StoredCell {
    value: Data,
    formula: Option<String>,
}

/// One worksheet, cells keyed by absolute `(row, col)`.
#[derive(Debug, Clone)]
struct StoredSheet {
    name: String,
    visible: SheetVisible,
    cells: BTreeMap<(u32, u16), StoredCell>,
}

impl StoredSheet {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            visible: SheetVisible::Visible,
            cells: BTreeMap::new(),
        }
    }

    /// First row below every used cell.
    fn next_row(&self) -> u32 {
        self.cells.keys().map(|(row, _)| row + 1).max().unwrap_or(0)
    }
}

pub struct OutputStore {
    path: PathBuf,
    /// Whether the file is on disk, either from before or after a write.
    existed: bool,
    /// Every worksheet in workbook order; `Sheet1` among them.
    sheets: Vec<StoredSheet>,
    /// Index of `Sheet1` in `sheets`.
    target: usize,
    /// Text view of `Sheet1`.
    rows: Vec<Vec<String>>,
}

impl OutputStore {
    /// Load an existing workbook, or prepare a new one that is created with
    /// a header row on the first [`append`](Self::append).
    pub fn open_or_create(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "output store does not exist yet");
            return Ok(Self {
                path,
                existed: false,
                sheets: vec![StoredSheet::empty(SHEET_NAME)],
                target: 0,
                rows: Vec::new(),
            });
        }

        let mut workbook: Xlsx<_> = open_workbook(&path)?;
        let metadata = workbook.sheets_metadata().to_vec();
        let Some(target) = metadata.iter().position(|s| s.name == SHEET_NAME) else {
            return Err(StoreError::MissingSheet { path });
        };

        let mut sheets = Vec::with_capacity(metadata.len());
        for sheet in &metadata {
            if sheet.typ != SheetType::WorkSheet {
                return Err(StoreError::UnsupportedSheet {
                    path,
                    name: sheet.name.clone(),
                    kind: format!("{:?}", sheet.typ),
                });
            }
            sheets.push(read_sheet(&mut workbook, &sheet.name, sheet.visible)?);
        }

        let rows: Vec<Vec<String>> = workbook
            .worksheet_range(SHEET_NAME)?
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();

        tracing::debug!(
            path = %path.display(),
            sheets = sheets.len(),
            rows = rows.len(),
            "opened output store"
        );
        Ok(Self {
            path,
            existed: true,
            sheets,
            target,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the workbook is on disk. An existing file never gets a header
    /// added, even when `Sheet1` is empty.
    pub fn exists(&self) -> bool {
        self.existed
    }

    /// All rows of `Sheet1` as text, header included.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Rows below the header, or all rows when the sheet has none.
    pub fn data_row_count(&self) -> usize {
        match self.rows.first() {
            Some(first) if first.len() >= 2 && first[..2] == HEADER => self.rows.len() - 1,
            _ => self.rows.len(),
        }
    }

    /// Append one row after the last used row of `Sheet1`.
    ///
    /// Rejected rows ([`StoreError::is_row_rejection`]) leave both the file
    /// and the in-memory rows unchanged.
    pub fn append(&mut self, record: &AnnotationRecord) -> Result<(), StoreError> {
        validate_cell(&record.text)?;
        validate_cell(&record.category)?;

        let mut pending: Vec<Vec<String>> = Vec::with_capacity(2);
        if !self.existed {
            pending.push(HEADER.iter().map(|h| h.to_string()).collect());
        }
        pending.push(vec![record.text.clone(), record.category.clone()]);

        let first_row = self.sheets[self.target].next_row();
        let mut new_cells = Vec::new();
        for (offset, row) in pending.iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let cell = StoredCell {
                    value: Data::String(value.clone()),
                    formula: None,
                };
                new_cells.push(((first_row + offset as u32, col as u16), cell));
            }
        }

        self.write_with(&new_cells)?;
        self.sheets[self.target].cells.extend(new_cells);
        self.rows.extend(pending);
        self.existed = true;
        Ok(())
    }

    fn write_with(&self, new_cells: &[((u32, u16), StoredCell)]) -> Result<(), StoreError> {
        let datetime = Format::new().set_num_format(DATETIME_FORMAT);
        let duration = Format::new().set_num_format(DURATION_FORMAT);
        let mut workbook = Workbook::new();

        for (idx, stored) in self.sheets.iter().enumerate() {
            let sheet = workbook.add_worksheet();
            sheet.set_name(&stored.name)?;
            match stored.visible {
                SheetVisible::Visible => {}
                SheetVisible::Hidden => {
                    sheet.set_hidden(true);
                }
                SheetVisible::VeryHidden => {
                    sheet.set_very_hidden(true);
                }
            }

            for (&(row, col), cell) in &stored.cells {
                write_cell(sheet, row, col, cell, &datetime, &duration)?;
            }
            if idx == self.target {
                for ((row, col), cell) in new_cells {
                    write_cell(sheet, *row, *col, cell, &datetime, &duration)?;
                }
            }
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let tmp = tempfile::Builder::new()
            .prefix(".annotator-")
            .suffix(".xlsx")
            .tempfile_in(dir)?;
        workbook.save(tmp.path())?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

fn read_sheet<RS: Read + Seek>(
    workbook: &mut Xlsx<RS>,
    name: &str,
    visible: SheetVisible,
) -> Result<StoredSheet, StoreError> {
    let values = workbook.worksheet_range(name)?;
    let formulas = workbook.worksheet_formula(name)?;
    let mut sheet = StoredSheet {
        name: name.to_string(),
        visible,
        cells: BTreeMap::new(),
    };

    if let Some((row0, col0)) = values.start() {
        for (r, c, value) in values.used_cells() {
            let key = (row0 + r as u32, (col0 as usize + c) as u16);
            sheet.cells.insert(
                key,
                StoredCell {
                    value: value.clone(),
                    formula: None,
                },
            );
        }
    }
    if let Some((row0, col0)) = formulas.start() {
        for (r, c, formula) in formulas.used_cells() {
            if formula.is_empty() {
                continue;
            }
            let key = (row0 + r as u32, (col0 as usize + c) as u16);
            sheet
                .cells
                .entry(key)
                .or_insert(StoredCell {
                    value: Data::Empty,
                    formula: None,
                })
                .formula = Some(formula.clone());
        }
    }
    Ok(sheet)
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &StoredCell,
    datetime: &Format,
    duration: &Format,
) -> Result<(), StoreError> {
    if let Some(formula) = &cell.formula {
        let mut formula = Formula::new(formula);
        if cell.value != Data::Empty {
            formula = formula.set_result(cell.value.to_string());
        }
        sheet.write_formula(row, col, formula)?;
        return Ok(());
    }

    match &cell.value {
        Data::Empty => {}
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            sheet.write_string(row, col, s)?;
        }
        Data::Float(f) => {
            sheet.write_number(row, col, *f)?;
        }
        Data::Int(i) => {
            sheet.write_number(row, col, *i as f64)?;
        }
        Data::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Data::DateTime(dt) => {
            let format = if dt.is_duration() { duration } else { datetime };
            sheet.write_number_with_format(row, col, dt.as_f64(), format)?;
        }
        Data::Error(e) => {
            sheet.write_string(row, col, e.to_string())?;
        }
    }
    Ok(())
}

fn validate_cell(value: &str) -> Result<(), StoreError> {
    if let Some(c) = value.chars().find(|c| is_illegal_cell_char(*c)) {
        return Err(StoreError::IllegalCharacter { code: c as u32 });
    }
    let chars = value.chars().count();
    if chars > MAX_CELL_CHARS {
        return Err(StoreError::CellTooLong { chars });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, category: &str) -> AnnotationRecord {
        AnnotationRecord::new(text, category)
    }

    #[test]
    fn new_store_writes_header_with_first_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        let mut store = OutputStore::open_or_create(&path).unwrap();
        assert!(!store.exists());
        assert!(!path.exists());

        store.append(&record("transformer paper", "Deep Learning")).unwrap();
        assert!(path.exists());

        let reopened = OutputStore::open_or_create(&path).unwrap();
        assert_eq!(
            reopened.rows(),
            &[
                vec!["Text".to_string(), "Category".to_string()],
                vec!["transformer paper".to_string(), "Deep Learning".to_string()],
            ]
        );
        assert_eq!(reopened.data_row_count(), 1);
    }

    #[test]
    fn reopened_store_appends_after_last_row_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        let mut first = OutputStore::open_or_create(&path).unwrap();
        first.append(&record("a", "NLP")).unwrap();
        first.append(&record("b", "Optimization")).unwrap();

        let mut second = OutputStore::open_or_create(&path).unwrap();
        second.append(&record("c", "Uncategorized")).unwrap();

        let reopened = OutputStore::open_or_create(&path).unwrap();
        let rows = reopened.rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], vec!["Text", "Category"]);
        assert_eq!(rows[1], vec!["a", "NLP"]);
        assert_eq!(rows[2], vec!["b", "Optimization"]);
        assert_eq!(rows[3], vec!["c", "Uncategorized"]);
    }

    #[test]
    fn record_fields_are_sanitized() {
        let r = record("bad\u{01}text\u{0C}", "NLP\u{1F}");
        assert_eq!(r.text, "badtext");
        assert_eq!(r.category, "NLP");
    }

    #[test]
    fn unsanitized_control_character_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let mut store = OutputStore::open_or_create(&path).unwrap();

        let raw = AnnotationRecord {
            text: "bell\u{07}".into(),
            category: "NLP".into(),
        };
        let err = store.append(&raw).unwrap_err();
        assert!(matches!(err, StoreError::IllegalCharacter { code: 7 }));
        assert!(err.is_row_rejection());
        assert!(!path.exists());
        assert!(store.rows().is_empty());
    }

    #[test]
    fn oversized_cell_is_rejected_and_store_stays_usable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let mut store = OutputStore::open_or_create(&path).unwrap();

        let huge = "x".repeat(MAX_CELL_CHARS + 1);
        let err = store.append(&record(&huge, "NLP")).unwrap_err();
        assert!(matches!(err, StoreError::CellTooLong { .. }));
        assert!(err.is_row_rejection());

        store.append(&record("fine", "NLP")).unwrap();
        assert_eq!(store.data_row_count(), 1);
    }

    #[test]
    fn append_keeps_other_sheets_and_typed_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.xlsx");

        let date = Format::new().set_num_format("yyyy-mm-dd");
        let mut workbook = Workbook::new();
        let results = workbook.add_worksheet();
        results.set_name(SHEET_NAME).unwrap();
        results.write_string(0, 0, "Text").unwrap();
        results.write_string(0, 1, "Category").unwrap();
        results.write_string(1, 0, "old").unwrap();
        results.write_number(1, 1, 42.0).unwrap();
        results.write_boolean(1, 2, true).unwrap();
        results.write_number_with_format(1, 3, 45000.0, &date).unwrap();
        let notes = workbook.add_worksheet();
        notes.set_name("Notes").unwrap();
        notes.write_string(0, 0, "reviewed by hand").unwrap();
        notes
            .write_formula(1, 0, Formula::new("=1+1").set_result("2"))
            .unwrap();
        workbook.save(&path).unwrap();

        let mut store = OutputStore::open_or_create(&path).unwrap();
        store.append(&record("new", "NLP")).unwrap();

        let mut reread: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(reread.sheet_names(), vec!["Sheet1", "Notes"]);

        let sheet1 = reread.worksheet_range(SHEET_NAME).unwrap();
        assert_eq!(sheet1.get_value((1, 0)), Some(&Data::String("old".into())));
        assert_eq!(sheet1.get_value((1, 1)), Some(&Data::Float(42.0)));
        assert_eq!(sheet1.get_value((1, 2)), Some(&Data::Bool(true)));
        match sheet1.get_value((1, 3)) {
            Some(Data::DateTime(dt)) => assert_eq!(dt.as_f64(), 45000.0),
            other => panic!("expected a date, got {other:?}"),
        }
        assert_eq!(sheet1.get_value((2, 0)), Some(&Data::String("new".into())));
        assert_eq!(sheet1.get_value((2, 1)), Some(&Data::String("NLP".into())));
        assert_eq!(sheet1.height(), 3);

        let notes = reread.worksheet_range("Notes").unwrap();
        assert_eq!(
            notes.get_value((0, 0)),
            Some(&Data::String("reviewed by hand".into()))
        );
        let formulas = reread.worksheet_formula("Notes").unwrap();
        assert_eq!(formulas.get_value((1, 0)).map(String::as_str), Some("1+1"));
    }

    #[test]
    fn hidden_sheet_stays_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hidden.xlsx");

        let mut workbook = Workbook::new();
        workbook.add_worksheet().set_name(SHEET_NAME).unwrap();
        let lookup = workbook.add_worksheet();
        lookup.set_name("Lookup").unwrap();
        lookup.write_string(0, 0, "k").unwrap();
        lookup.set_hidden(true);
        workbook.save(&path).unwrap();

        let mut store = OutputStore::open_or_create(&path).unwrap();
        store.append(&record("a", "NLP")).unwrap();

        let reread: Xlsx<_> = open_workbook(&path).unwrap();
        let lookup = reread
            .sheets_metadata()
            .iter()
            .find(|s| s.name == "Lookup")
            .unwrap();
        assert_eq!(lookup.visible, SheetVisible::Hidden);
    }

    #[test]
    fn existing_empty_sheet_gets_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");

        let mut workbook = Workbook::new();
        workbook.add_worksheet().set_name(SHEET_NAME).unwrap();
        workbook.save(&path).unwrap();

        let mut store = OutputStore::open_or_create(&path).unwrap();
        assert!(store.exists());
        assert!(store.rows().is_empty());

        store.append(&record("new", "NLP")).unwrap();
        assert_eq!(store.data_row_count(), 1);

        let reopened = OutputStore::open_or_create(&path).unwrap();
        assert_eq!(reopened.rows(), &[vec!["new".to_string(), "NLP".to_string()]]);
        assert_eq!(reopened.data_row_count(), 1);
    }

    #[test]
    fn missing_sheet_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Results").unwrap();
        sheet.write_string(0, 0, "Text").unwrap();
        workbook.save(&path).unwrap();

        let err = OutputStore::open_or_create(&path).err().unwrap();
        assert!(matches!(err, StoreError::MissingSheet { .. }));
        assert!(!err.is_row_rejection());
    }

    #[test]
    fn corrupt_store_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"this is not a zip archive").unwrap();

        let err = OutputStore::open_or_create(&path).err().unwrap();
        assert!(matches!(err, StoreError::Read(_)));
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let mut store = OutputStore::open_or_create(&path).unwrap();
        store.append(&record("a", "NLP")).unwrap();
        store.append(&record("b", "NLP")).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["out.xlsx".to_string()]);
    }
}
