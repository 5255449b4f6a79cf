use calamine::{Data, Reader, open_workbook_auto};
use polars::prelude::*;
use rayon::prelude::*;
use rust_xlsxwriter::{Workbook, XlsxError};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use crate::domain::TVError;
use crate::table::{Table, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileType {
    CSV,
    PARQUET,
    ARROW,
    EXCEL,
}

/// Largest magnitude an f64 holds without losing integer precision.
const MAX_EXACT_INTEGER: u64 = 1 << 53;

#[derive(Debug)]
struct FileInfo {
    path: PathBuf,
    file_size: u64,
    file_type: FileType,
}

/// Storage type picked for a column when writing.
#[derive(Debug, PartialEq)]
enum ColumnKind {
    Number,
    Boolean,
    Text,
}

/// Reads a file into column names and rows of values.
pub fn read_file(path: &Path) -> Result<(Vec<String>, Vec<Vec<Value>>), TVError> {
    let file_info = get_file_info(path)?;
    let start_time = Instant::now();

    let frame = match file_info.file_type {
        FileType::CSV => load_csv(&file_info.path),
        FileType::PARQUET => load_parquet(&file_info.path),
        FileType::ARROW => load_arrow(&file_info.path),
        FileType::EXCEL => {
            let (names, rows) = load_excel(&file_info.path)?;
            info!(
                "Loaded {} ({} bytes, {:?}): {} rows x {} columns in {}ms",
                file_info.path.display(),
                file_info.file_size,
                file_info.file_type,
                rows.len(),
                names.len(),
                start_time.elapsed().as_millis()
            );
            return Ok((names, rows));
        }
    };
    let df = frame
        .and_then(|f| f.collect())
        .map_err(|e| TVError::load(path, e))?;

    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    // Each column is converted in its own task.
    let columns: Vec<Vec<Value>> = names
        .par_iter()
        .map(|name| load_column(&df, name))
        .collect::<Result<_, PolarsError>>()
        .map_err(|e| TVError::load(path, e))?;

    let rows: Vec<Vec<Value>> = (0..df.height())
        .map(|ridx| columns.iter().map(|c| c[ridx].clone()).collect())
        .collect();

    info!(
        "Loaded {} ({} bytes, {:?}): {} rows x {} columns in {}ms",
        file_info.path.display(),
        file_info.file_size,
        file_info.file_type,
        rows.len(),
        names.len(),
        start_time.elapsed().as_millis()
    );
    Ok((names, rows))
}

pub fn load_table(path: &Path) -> Result<Table, TVError> {
    let (columns, rows) = read_file(path)?;
    Table::load(columns, rows)
}

/// Writes the table to `path`, either all rows or only `rows` in the given
/// order. The format follows the file extension.
pub fn write_file(table: &Table, rows: Option<&[usize]>, path: &Path) -> Result<(), TVError> {
    let start_time = Instant::now();
    let file_type = detect_file_type(path)
        .ok_or_else(|| TVError::save(path, "unsupported file type"))?;

    let indices: Vec<usize> = match rows {
        Some(rows) => rows.to_vec(),
        None => (0..table.row_count()).collect(),
    };

    match file_type {
        FileType::EXCEL => {
            write_excel(table, &indices, path).map_err(|e| TVError::save(path, e))?
        }
        _ => {
            let columns: Vec<Column> = (0..table.column_count())
                .into_par_iter()
                .map(|cidx| build_column(table, &indices, cidx))
                .collect::<Result<_, TVError>>()
                .map_err(|e| TVError::save(path, e))?;

            let mut df = DataFrame::new(columns).map_err(|e| TVError::save(path, e))?;
            write_frame(&mut df, file_type, path).map_err(|e| TVError::save(path, e))?;
        }
    }

    info!(
        "Saved {} rows to {} in {}ms",
        indices.len(),
        path.display(),
        start_time.elapsed().as_millis()
    );
    Ok(())
}

fn write_frame(df: &mut DataFrame, file_type: FileType, path: &Path) -> Result<(), TVError> {
    match file_type {
        FileType::CSV => CsvWriter::new(File::create(path)?)
            .include_header(true)
            .finish(df)?,
        FileType::PARQUET => {
            ParquetWriter::new(File::create(path)?).finish(df)?;
        }
        FileType::ARROW => IpcWriter::new(File::create(path)?).finish(df)?,
        FileType::EXCEL => return Err(TVError::save(path, "excel is written cell by cell")),
    }
    Ok(())
}

/// First worksheet: header row, then one row per record. Empty and error
/// cells become nulls, empty header cells become "".
fn load_excel(path: &Path) -> Result<(Vec<String>, Vec<Vec<Value>>), TVError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| TVError::load(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TVError::load(path, "workbook has no sheets"))?
        .map_err(|e| TVError::load(path, e))?;

    let mut sheet_rows = range.rows();
    let names: Vec<String> = match sheet_rows.next() {
        Some(header) => header
            .iter()
            .map(|cell| match cell {
                Data::Empty => String::new(),
                other => other.to_string(),
            })
            .collect(),
        None => Vec::new(),
    };
    let rows: Vec<Vec<Value>> = sheet_rows
        .map(|row| row.iter().map(excel_value).collect())
        .collect();
    debug!("Sheet of {} read with {} columns", path.display(), names.len());
    Ok((names, rows))
}

fn excel_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Bool(b) => Value::Boolean(*b),
        Data::Float(f) => Value::Number(*f),
        Data::Int(i) => integer_value(&i.to_string()),
        Data::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

fn write_excel(table: &Table, rows: &[usize], path: &Path) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    for (cidx, name) in table.columns().iter().enumerate() {
        worksheet.write_string(0, cidx as u16, name)?;
    }
    for (out_row, &ridx) in rows.iter().enumerate() {
        let Some(values) = table.row(ridx) else {
            continue;
        };
        let xrow = out_row as u32 + 1;
        for (cidx, value) in values.iter().enumerate() {
            let xcol = cidx as u16;
            match value {
                Value::Null => continue,
                Value::Number(n) => worksheet.write_number(xrow, xcol, *n)?,
                Value::Boolean(b) => worksheet.write_boolean(xrow, xcol, *b)?,
                Value::String(s) => worksheet.write_string(xrow, xcol, s)?,
            };
        }
    }
    workbook.save(path)
}

fn build_column(table: &Table, rows: &[usize], cidx: usize) -> Result<Column, TVError> {
    let name = table.column_name(cidx)?;
    let values = rows
        .iter()
        .map(|&ridx| table.get(ridx, cidx))
        .collect::<Result<Vec<&Value>, TVError>>()?;

    let kind = column_kind(&values);
    debug!("Writing column \"{name}\" as {kind:?}");
    let column = match kind {
        ColumnKind::Number => Column::new(
            name.into(),
            values
                .iter()
                .map(|v| match v {
                    Value::Number(n) => Some(*n),
                    _ => None,
                })
                .collect::<Vec<Option<f64>>>(),
        ),
        ColumnKind::Boolean => Column::new(
            name.into(),
            values
                .iter()
                .map(|v| match v {
                    Value::Boolean(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<Option<bool>>>(),
        ),
        ColumnKind::Text => Column::new(
            name.into(),
            values
                .iter()
                .map(|v| (!v.is_null()).then(|| v.to_string()))
                .collect::<Vec<Option<String>>>(),
        ),
    };
    Ok(column)
}

/// Number or boolean only if every non-null value has that type.
fn column_kind(values: &[&Value]) -> ColumnKind {
    let mut present = values.iter().filter(|v| !v.is_null()).peekable();
    if present.peek().is_none() {
        return ColumnKind::Text;
    }
    let present: Vec<&&Value> = present.collect();
    if present.iter().all(|v| matches!(v, Value::Number(_))) {
        ColumnKind::Number
    } else if present.iter().all(|v| matches!(v, Value::Boolean(_))) {
        ColumnKind::Boolean
    } else {
        ColumnKind::Text
    }
}

fn is_integer_type(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

fn is_float_type(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Float32 | DataType::Float64)
}

/// Integers that an f64 cannot hold exactly keep their digits as text.
fn integer_value(text: &str) -> Value {
    match text.parse::<i128>() {
        Ok(n) if n.unsigned_abs() <= MAX_EXACT_INTEGER as u128 => Value::Number(n as f64),
        _ => Value::String(text.to_string()),
    }
}

fn load_column(df: &DataFrame, col_name: &str) -> Result<Vec<Value>, PolarsError> {
    let column = df.column(col_name)?;
    let dtype = column.dtype().clone();

    let values = if is_integer_type(&dtype) {
        let col = column.cast(&DataType::String)?;
        col.str()?
            .into_iter()
            .map(|v| v.map(integer_value).unwrap_or(Value::Null))
            .collect()
    } else if is_float_type(&dtype) {
        let col = column.cast(&DataType::Float64)?;
        col.f64()?.into_iter().map(Value::from).collect()
    } else if dtype == DataType::Boolean {
        column.bool()?.into_iter().map(Value::from).collect()
    } else {
        let col = column.cast(&DataType::String)?;
        col.str()?.into_iter().map(Value::from).collect()
    };
    debug!("Column \"{col_name}\" loaded from {dtype:?}");
    Ok(values)
}

fn detect_file_type(path: &Path) -> Option<FileType> {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_uppercase())
        .as_deref()
    {
        Some("CSV") => Some(FileType::CSV),
        Some("PARQUET") | Some("PQ") => Some(FileType::PARQUET),
        Some("ARROW") | Some("IPC") | Some("FEATHER") => Some(FileType::ARROW),
        Some("XLSX") | Some("XLSM") => Some(FileType::EXCEL),
        _ => None,
    }
}

fn get_file_info(path: &Path) -> Result<FileInfo, TVError> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => TVError::load(path, "file not found"),
        ErrorKind::PermissionDenied => TVError::load(path, "permission denied"),
        _ => TVError::load(path, e),
    })?;
    if !metadata.is_file() {
        return Err(TVError::load(path, "not a file"));
    }

    let file_type =
        detect_file_type(path).ok_or_else(|| TVError::load(path, "unsupported file type"))?;

    Ok(FileInfo {
        path: path.to_path_buf(),
        file_size: metadata.len(),
        file_type,
    })
}

fn load_csv(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyCsvReader::new(PlPath::Local(path.into()))
        .with_has_header(true)
        .finish()
}

fn load_parquet(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_parquet(PlPath::Local(path.into()), ScanArgsParquet::default())
}

fn load_arrow(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_ipc(
        PlPath::Local(path.into()),
        polars::io::ipc::IpcScanOptions,
        UnifiedScanArgs::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::players;
    use tempfile::tempdir;

    const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/checklist.csv");

    fn load_fixture() -> Table {
        load_table(Path::new(FIXTURE)).unwrap()
    }

    #[test]
    fn test_load_fixture() {
        let table = load_fixture();
        assert_eq!(table.columns(), &["Card", "Player", "Team", "Year", "Owned"]);
        assert_eq!(table.row_count(), 8);
        assert_eq!(table.get(0, 1).unwrap(), &Value::String("Mike Trout".into()));
        assert_eq!(table.get(0, 3).unwrap(), &Value::Number(2011.0));
        assert_eq!(table.get(0, 4).unwrap(), &Value::Boolean(false));
        assert_eq!(table.display(1, 4).unwrap(), "True");
    }

    #[test]
    fn test_missing_file() {
        let err = load_table(Path::new("does/not/exist.csv")).unwrap_err();
        match err {
            TVError::Load { cause, .. } => assert_eq!(cause, "file not found"),
            e => panic!("unexpected error {e:?}"),
        }
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("set.ods");
        fs::write(&path, b"not a spreadsheet").unwrap();
        let err = read_file(&path).unwrap_err();
        assert!(matches!(err, TVError::Load { ref cause, .. } if cause == "unsupported file type"));
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = tempdir().unwrap();
        let err = read_file(dir.path()).unwrap_err();
        assert!(matches!(err, TVError::Load { ref cause, .. } if cause == "not a file"));
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("players.csv");
        write_file(&players(), None, &path).unwrap();

        let table = load_table(&path).unwrap();
        assert_eq!(table.columns(), &["Player", "Team", "Owned"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.display(1, 0).unwrap(), "Bryce Harper");
        assert_eq!(table.get(1, 2).unwrap(), &Value::Boolean(true));
    }

    #[test]
    fn test_parquet_keeps_types_and_nulls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cards.parquet");
        let source = Table::load(
            vec!["Player".into(), "No".into()],
            vec![
                vec!["Ken Griffey Jr.".into(), Value::Number(1.0)],
                vec![Value::Null, Value::Null],
            ],
        )
        .unwrap();
        write_file(&source, None, &path).unwrap();

        let table = load_table(&path).unwrap();
        assert_eq!(table.get(0, 1).unwrap(), &Value::Number(1.0));
        assert_eq!(table.get(1, 0).unwrap(), &Value::Null);
        assert_eq!(table.get(1, 1).unwrap(), &Value::Null);
    }

    #[test]
    fn test_write_visible_rows_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subset.arrow");
        let source = load_fixture();
        write_file(&source, Some([3, 1].as_slice()), &path).unwrap();

        let table = load_table(&path).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.display(0, 1).unwrap(), source.display(3, 1).unwrap());
        assert_eq!(table.display(1, 1).unwrap(), source.display(1, 1).unwrap());
    }

    #[test]
    fn test_save_errors() {
        let dir = tempdir().unwrap();
        let err = write_file(&players(), None, &dir.path().join("out.ods")).unwrap_err();
        assert!(matches!(err, TVError::Save { .. }));

        let missing_dir = dir.path().join("nope").join("out.csv");
        let err = write_file(&players(), None, &missing_dir).unwrap_err();
        assert!(matches!(err, TVError::Save { .. }));

        let duplicated = Table::load(
            vec!["Team".into(), "Team".into()],
            vec![vec!["A".into(), "B".into()]],
        )
        .unwrap();
        let err = write_file(&duplicated, None, &dir.path().join("dup.csv")).unwrap_err();
        assert!(matches!(err, TVError::Save { .. }));
    }

    #[test]
    fn test_excel_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("players.xlsx");
        let source = Table::load(
            vec!["Player".into(), "".into(), "Owned".into()],
            vec![
                vec!["Mike Trout".into(), Value::Number(2011.0), false.into()],
                vec!["Bryce Harper".into(), Value::Null, true.into()],
            ],
        )
        .unwrap();
        write_file(&source, None, &path).unwrap();

        let table = load_table(&path).unwrap();
        assert_eq!(table.columns(), &["Player", "", "Owned"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.display(1, 0).unwrap(), "Bryce Harper");
        assert_eq!(table.get(0, 1).unwrap(), &Value::Number(2011.0));
        assert_eq!(table.get(1, 1).unwrap(), &Value::Null);
        assert_eq!(table.get(1, 2).unwrap(), &Value::Boolean(true));
    }

    #[test]
    fn test_excel_visible_rows_and_bad_workbook() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subset.xlsx");
        write_file(&load_fixture(), Some([6].as_slice()), &path).unwrap();
        let table = load_table(&path).unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.display(0, 1).unwrap(), "Ken Griffey Jr.");
        assert_eq!(table.display(0, 3).unwrap(), "1989");

        let broken = dir.path().join("broken.xlsx");
        fs::write(&broken, b"not a spreadsheet").unwrap();
        assert!(matches!(read_file(&broken), Err(TVError::Load { .. })));
    }

    #[test]
    fn test_large_integers_keep_their_digits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ids.csv");
        fs::write(&path, "Id,Card\n9007199254740993,a\n-42,b\n").unwrap();

        let table = load_table(&path).unwrap();
        assert_eq!(table.get(0, 0).unwrap(), &Value::String("9007199254740993".into()));
        assert_eq!(table.get(1, 0).unwrap(), &Value::Number(-42.0));
        assert_eq!(integer_value("9007199254740992"), Value::Number(9007199254740992.0));
    }

    #[test]
    fn test_column_kind() {
        let n = Value::Number(1.0);
        let b = Value::Boolean(true);
        let s = Value::String("x".into());
        assert_eq!(column_kind(&[&n, &Value::Null]), ColumnKind::Number);
        assert_eq!(column_kind(&[&b, &Value::Null]), ColumnKind::Boolean);
        assert_eq!(column_kind(&[&n, &b]), ColumnKind::Text);
        assert_eq!(column_kind(&[&s]), ColumnKind::Text);
        assert_eq!(column_kind(&[&Value::Null]), ColumnKind::Text);
    }
}
