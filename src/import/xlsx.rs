//! XLSX reading
//!
//! Reads the first worksheet of an Office Open XML workbook straight from the
//! zip container: shared strings, the cell style table (to tell dates from
//! plain numbers) and the sheet's cell data.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use zip::ZipArchive;
use zip::result::ZipError;

use super::FileKind;
use super::error::{IngestError, IngestResult};
use crate::models::CellValue;
use crate::validation::coerce::{excel_serial_to_date, parse_date_text};

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// Sheet bounds of the format: 1,048,576 rows and columns up to `XFD`
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

fn unreadable(reason: impl Into<String>) -> IngestError {
    IngestError::unreadable(FileKind::Xlsx, reason)
}

/// Read the first worksheet into a grid indexed by sheet row
pub(super) fn read_grid(bytes: &[u8]) -> IngestResult<Vec<Vec<CellValue>>> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| unreadable(format!("not a zip archive: {e}")))?;

    let shared_strings = match read_part(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };
    let date_styles = match read_part(&mut archive, "xl/styles.xml")? {
        Some(xml) => parse_date_styles(&xml)?,
        None => HashSet::new(),
    };

    let sheet_path = first_sheet_path(&mut archive)?;
    let sheet_xml = read_part(&mut archive, &sheet_path)?
        .ok_or_else(|| unreadable(format!("worksheet {sheet_path} is missing")))?;

    parse_sheet(&sheet_xml, &shared_strings, &date_styles)
}

fn read_part(archive: &mut Archive<'_>, name: &str) -> IngestResult<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(unreadable(format!("{name}: {e}"))),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| unreadable(format!("{name}: {e}")))?;
    Ok(Some(content))
}

/// Resolve the first `<sheet>` of the workbook through its relationship
fn first_sheet_path(archive: &mut Archive<'_>) -> IngestResult<String> {
    let fallback = || -> IngestResult<String> {
        Ok("xl/worksheets/sheet1.xml".to_string())
    };

    let Some(workbook) = read_part(archive, "xl/workbook.xml")? else {
        return fallback();
    };
    let Some(rel_id) = first_sheet_rel_id(&workbook)? else {
        return fallback();
    };
    let Some(rels) = read_part(archive, "xl/_rels/workbook.xml.rels")? else {
        return fallback();
    };

    let mut reader = Reader::from_str(&rels);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if attr(e, b"Id").as_deref() == Some(rel_id.as_str())
                    && let Some(target) = attr(e, b"Target")
                {
                    return Ok(match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{target}"),
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(unreadable(format!("workbook relationships: {e}"))),
            _ => {}
        }
    }
    fallback()
}

fn first_sheet_rel_id(workbook: &str) -> IngestResult<Option<String>> {
    let mut reader = Reader::from_str(workbook);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"sheet" =>
            {
                return Ok(e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.local_name().as_ref() == b"id")
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned()));
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(unreadable(format!("workbook: {e}"))),
            _ => {}
        }
    }
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Shared string table; rich-text runs are concatenated
fn parse_shared_strings(xml: &str) -> IngestResult<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    // Phonetic runs repeat the text and must be skipped
    let mut in_phonetic = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::Text(e)) if in_text && !in_phonetic => {
                let text = e
                    .unescape()
                    .map_err(|err| unreadable(format!("shared strings: {err}")))?;
                if let Some(buf) = current.as_mut() {
                    buf.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(unreadable(format!("shared strings: {e}"))),
            _ => {}
        }
    }
    Ok(strings)
}

/// Indices into `cellXfs` whose number format displays a date
fn parse_date_styles(xml: &str) -> IngestResult<HashSet<usize>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut custom_formats: HashMap<u32, String> = HashMap::new();
    let mut xf_formats: Vec<u32> = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event() {
            // An empty `<cellXfs/>` holds no entries, so only a start tag opens the block
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"cellXfs" => {
                in_cell_xfs = true;
            }
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"numFmt" => {
                    if let (Some(id), Some(code)) = (attr(e, b"numFmtId"), attr(e, b"formatCode"))
                        && let Ok(id) = id.parse::<u32>()
                    {
                        custom_formats.insert(id, code);
                    }
                }
                b"xf" if in_cell_xfs => {
                    let id = attr(e, b"numFmtId")
                        .and_then(|v| v.parse::<u32>().ok())
                        .unwrap_or(0);
                    xf_formats.push(id);
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"cellXfs" => {
                in_cell_xfs = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(unreadable(format!("styles: {e}"))),
            _ => {}
        }
    }

    Ok(xf_formats
        .into_iter()
        .enumerate()
        .filter(|(_, id)| is_date_format(*id, custom_formats.get(id).map(String::as_str)))
        .map(|(idx, _)| idx)
        .collect())
}

/// Built-in date formats are 14-22 and 45-47; custom ones are judged by code
fn is_date_format(id: u32, custom_code: Option<&str>) -> bool {
    if (14..=22).contains(&id) || (45..=47).contains(&id) {
        return true;
    }
    let Some(code) = custom_code else {
        return false;
    };

    // Drop quoted literals and bracketed sections like [Red] or [$-409]
    let mut stripped = String::new();
    let mut in_quote = false;
    let mut in_bracket = false;
    for c in code.chars() {
        match c {
            '"' => in_quote = !in_quote,
            '[' if !in_quote => in_bracket = true,
            ']' if !in_quote => in_bracket = false,
            _ if in_quote || in_bracket => {}
            _ => stripped.push(c.to_ascii_lowercase()),
        }
    }
    stripped.contains('y') || stripped.contains('d')
}

/// A cell being assembled while reading the sheet
struct PendingCell {
    column: usize,
    cell_type: String,
    style: Option<usize>,
    raw: String,
}

fn parse_sheet(
    xml: &str,
    shared_strings: &[String],
    date_styles: &HashSet<usize>,
) -> IngestResult<Vec<Vec<CellValue>>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut grid: Vec<Vec<CellValue>> = Vec::new();
    let mut row_index: Option<usize> = None;
    let mut next_column = 0usize;
    let mut pending: Option<PendingCell> = None;
    let mut in_value = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    row_index = Some(row_number(e, row_index)?);
                    next_column = 0;
                }
                b"c" => {
                    pending = Some(start_cell(e, next_column)?);
                }
                b"v" | b"t" if pending.is_some() => in_value = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    row_index = Some(row_number(e, row_index)?);
                    next_column = 0;
                }
                b"c" => {
                    // A cell with only a style carries no value
                    let cell = start_cell(e, next_column)?;
                    next_column = cell.column + 1;
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_value => {
                let text = e
                    .unescape()
                    .map_err(|err| unreadable(format!("worksheet: {err}")))?;
                if let Some(cell) = pending.as_mut() {
                    cell.raw.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(cell) = pending.take() {
                        let row = row_index.unwrap_or(0);
                        next_column = cell.column + 1;
                        let value = convert_cell(&cell, shared_strings, date_styles)?;
                        if grid.len() <= row {
                            grid.resize_with(row + 1, Vec::new);
                        }
                        let cells = &mut grid[row];
                        if cells.len() <= cell.column {
                            cells.resize(cell.column + 1, CellValue::Blank);
                        }
                        cells[cell.column] = value;
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(unreadable(format!("worksheet: {e}"))),
            _ => {}
        }
    }

    Ok(grid)
}

fn row_number(e: &BytesStart<'_>, previous: Option<usize>) -> IngestResult<usize> {
    match attr(e, b"r") {
        Some(r) => r
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=MAX_ROWS).contains(n))
            .map(|n| n - 1)
            .ok_or_else(|| unreadable(format!("invalid row number '{r}'"))),
        None => {
            let row = previous.map(|p| p + 1).unwrap_or(0);
            if row >= MAX_ROWS {
                return Err(unreadable(format!("worksheet has more than {MAX_ROWS} rows")));
            }
            Ok(row)
        }
    }
}

fn start_cell(e: &BytesStart<'_>, next_column: usize) -> IngestResult<PendingCell> {
    let column = match attr(e, b"r") {
        Some(reference) => column_index(&reference)
            .ok_or_else(|| unreadable(format!("invalid cell reference '{reference}'")))?,
        None if next_column < MAX_COLUMNS => next_column,
        None => {
            return Err(unreadable(format!(
                "row has more than {MAX_COLUMNS} columns"
            )));
        }
    };
    Ok(PendingCell {
        column,
        cell_type: attr(e, b"t").unwrap_or_else(|| "n".to_string()),
        style: attr(e, b"s").and_then(|s| s.parse().ok()),
        raw: String::new(),
    })
}

/// `"C7"` -> 2; `None` past column `XFD`
fn column_index(reference: &str) -> Option<usize> {
    let letters: String = reference
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for c in letters.chars() {
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
        if index > MAX_COLUMNS {
            return None;
        }
    }
    Some(index - 1)
}

fn convert_cell(
    cell: &PendingCell,
    shared_strings: &[String],
    date_styles: &HashSet<usize>,
) -> IngestResult<CellValue> {
    let raw = cell.raw.as_str();
    if raw.is_empty() {
        return Ok(CellValue::Blank);
    }

    Ok(match cell.cell_type.as_str() {
        "s" => {
            let idx: usize = raw
                .trim()
                .parse()
                .map_err(|_| unreadable(format!("invalid shared string index '{raw}'")))?;
            let text = shared_strings
                .get(idx)
                .ok_or_else(|| unreadable(format!("shared string {idx} does not exist")))?;
            CellValue::text(text.clone())
        }
        "str" | "inlineStr" | "e" => CellValue::text(raw),
        "b" => CellValue::Bool(raw.trim() == "1"),
        "d" => parse_date_text(raw)
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::text(raw)),
        _ => {
            let number: f64 = raw
                .trim()
                .parse()
                .map_err(|_| unreadable(format!("invalid number '{raw}'")))?;
            let is_date = cell.style.map(|s| date_styles.contains(&s)).unwrap_or(false);
            match is_date.then(|| excel_serial_to_date(number)).flatten() {
                Some(date) => CellValue::Date(date),
                None => CellValue::Number(number),
            }
        }
    })
}
