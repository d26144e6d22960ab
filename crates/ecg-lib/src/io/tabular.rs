use crate::error::FormatError;
use crate::signal::{SampleMatrix, SamplingContext};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;

/// Values read from text tables are taken as millivolts already.
pub const TABULAR_UNIT_SCALE: f64 = 1000.0;

/// Parse a delimited table and keep the columns whose every cell is numeric.
///
/// The delimiter is sniffed from the first data line (`,`, `;` or tab). A header row is
/// recognised when it holds text where the following row holds a number.
pub fn load_tabular(
    text: &str,
    sampling_rate_hz: u32,
) -> Result<(SampleMatrix, SamplingContext), FormatError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(sniff_delimiter(text))
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| FormatError::Table(e.to_string()))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        records.push(record);
    }

    let body = if looks_like_header(&records) {
        debug!("treating first row as header: {:?}", &records[0]);
        &records[1..]
    } else {
        &records[..]
    };
    let width = body.first().map(StringRecord::len).ok_or(FormatError::Empty)?;
    for (row, record) in body.iter().enumerate() {
        if record.len() != width {
            return Err(FormatError::InconsistentRow {
                row,
                expected: width,
                found: record.len(),
            });
        }
    }

    let numeric: Vec<usize> = (0..width)
        .filter(|&col| body.iter().all(|r| parse_cell(&r[col]).is_some()))
        .collect();
    if numeric.is_empty() {
        return Err(FormatError::NoNumericColumns);
    }
    if numeric.len() < width {
        debug!(
            "dropping {} non-numeric column(s), keeping {}",
            width - numeric.len(),
            numeric.len()
        );
    }

    let mut data = Vec::with_capacity(body.len() * numeric.len());
    for record in body {
        for &col in &numeric {
            data.push(parse_cell(&record[col]).ok_or(FormatError::NoNumericColumns)?);
        }
    }

    let lead_count = numeric.len();
    let matrix = SampleMatrix::from_flat(data, lead_count)?;
    let context = SamplingContext::new(sampling_rate_hz, lead_count, TABULAR_UNIT_SCALE)?;
    Ok((matrix, context))
}

fn parse_cell(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn looks_like_header(records: &[StringRecord]) -> bool {
    let Some(first) = records.first() else {
        return false;
    };
    match records.get(1) {
        Some(second) => first
            .iter()
            .zip(second.iter())
            .any(|(a, b)| parse_cell(a).is_none() && parse_cell(b).is_some()),
        None => first.iter().any(|cell| parse_cell(cell).is_none()),
    }
}

fn sniff_delimiter(text: &str) -> u8 {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .unwrap_or("");
    [b',', b';', b'\t']
        .into_iter()
        .max_by_key(|&d| line.bytes().filter(|&b| b == d).count())
        .filter(|&d| line.as_bytes().contains(&d))
        .unwrap_or(b',')
}
