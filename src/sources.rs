use crate::constants::{AVERAGE_RATING, NUM_VOTES};
use crate::error::{EtlError, Result};
use crate::table::{Table, Value};
use async_trait::async_trait;
use flate2::read::MultiGzDecoder;
use std::io::Read;
use std::time::Duration;
use tracing::{debug, info};

/// How a source column is typed when the file is parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
}

/// A remote gzip TSV dataset
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub name: String,
    pub url: String,
    /// Columns that are not plain text. Everything else stays a string.
    pub typed_columns: Vec<(String, ColumnKind)>,
}

impl SourceSpec {
    pub fn title_basics(url: impl Into<String>) -> Self {
        Self {
            name: "title.basics".to_string(),
            url: url.into(),
            typed_columns: Vec::new(),
        }
    }

    pub fn title_ratings(url: impl Into<String>) -> Self {
        Self {
            name: "title.ratings".to_string(),
            url: url.into(),
            typed_columns: vec![
                (AVERAGE_RATING.to_string(), ColumnKind::Real),
                (NUM_VOTES.to_string(), ColumnKind::Integer),
            ],
        }
    }

    fn kind_of(&self, column: &str) -> ColumnKind {
        self.typed_columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, kind)| *kind)
            .unwrap_or(ColumnKind::Text)
    }
}

/// Retrieves the raw bytes behind a source locator
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, String>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EtlError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, String> {
        let resp = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {} from {}", status.as_u16(), url));
        }
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }
}

/// Fetch, decompress and parse one source into a table
pub async fn load_source(fetcher: &dyn SourceFetcher, spec: &SourceSpec) -> Result<Table> {
    info!("📡 Fetching {} from {}", spec.name, spec.url);
    let t_fetch = std::time::Instant::now();
    let bytes = fetcher
        .fetch(&spec.url)
        .await
        .map_err(|e| EtlError::source_unavailable(&spec.name, e))?;
    debug!(
        "Fetched {} bytes for {} in {:.2}s",
        bytes.len(),
        spec.name,
        t_fetch.elapsed().as_secs_f64()
    );

    let text = decompress(&bytes).map_err(|e| EtlError::source_unavailable(&spec.name, e))?;
    let table = parse_tsv(&text, spec)?;
    info!("✅ Parsed {} rows from {}", table.len(), spec.name);
    Ok(table)
}

/// Inflate a gzip payload, including concatenated members. Payloads without the gzip magic number are taken as-is,
/// which covers servers that already applied a transfer encoding.
pub fn decompress(bytes: &[u8]) -> std::result::Result<String, String> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut out = String::new();
        MultiGzDecoder::new(bytes)
            .read_to_string(&mut out)
            .map_err(|e| format!("gzip decode failed: {e}"))?;
        Ok(out)
    } else {
        String::from_utf8(bytes.to_vec()).map_err(|e| format!("payload is not UTF-8: {e}"))
    }
}

/// Parse tab-separated text with a header row.
///
/// A field opening with `"` is quoted: tabs inside it do not split the field, and
/// text after the closing quote is kept. Short rows are padded with nulls, rows
/// with more fields than the header are rejected, and empty fields are null.
pub fn parse_tsv(text: &str, spec: &SourceSpec) -> Result<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(true)
        .quote(b'"')
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| EtlError::source_unavailable(&spec.name, format!("bad header: {e}")))?
        .clone();
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(EtlError::source_unavailable(&spec.name, "missing header row"));
    }
    let kinds: Vec<ColumnKind> = headers.iter().map(|h| spec.kind_of(h)).collect();
    let mut table = Table::new(headers.iter());

    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| EtlError::source_unavailable(&spec.name, e))?;
        if record.len() > kinds.len() {
            return Err(EtlError::source_unavailable(
                &spec.name,
                format!("line {}: expected {} fields, saw {}", line + 2, kinds.len(), record.len()),
            ));
        }
        let mut row = Vec::with_capacity(kinds.len());
        for (field, kind) in record.iter().zip(&kinds) {
            row.push(parse_field(field, *kind).ok_or_else(|| {
                EtlError::source_unavailable(
                    &spec.name,
                    format!("line {}: cannot parse {:?} as {:?}", line + 2, field, kind),
                )
            })?);
        }
        table.push_row(row);
    }
    Ok(table)
}

fn parse_field(field: &str, kind: ColumnKind) -> Option<Value> {
    if field.is_empty() {
        return Some(Value::Null);
    }
    match kind {
        ColumnKind::Text => Some(Value::text(field)),
        ColumnKind::Integer => field.parse().ok().map(Value::Integer),
        ColumnKind::Real => field.parse().ok().map(Value::Real),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_decompress_gzip_and_plain() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"tconst\ttitleType\n").unwrap();
        let gz = enc.finish().unwrap();
        assert_eq!(decompress(&gz).unwrap(), "tconst\ttitleType\n");
        assert_eq!(decompress(b"plain").unwrap(), "plain");
    }

    #[test]
    fn test_corrupt_gzip_is_rejected() {
        assert!(decompress(&[0x1f, 0x8b, 0x00, 0x01]).is_err());
    }

    #[test]
    fn test_concatenated_gzip_members() {
        let mut gz = Vec::new();
        for part in [&b"tconst\tnumVotes\n"[..], &b"tt1\t10\n"[..]] {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(part).unwrap();
            gz.extend(enc.finish().unwrap());
        }
        assert_eq!(decompress(&gz).unwrap(), "tconst\tnumVotes\ntt1\t10\n");
    }

    #[test]
    fn test_parse_tsv_short_rows_and_quotes() {
        let text = "tconst\tprimaryTitle\tgenres\ntt1\t\"Quoted\" title\tDrama\ntt2\tShort\n";
        let table = parse_tsv(text, &SourceSpec::title_basics("u")).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "primaryTitle"), Some(&Value::text("Quoted title")));
        assert_eq!(table.get(1, "genres"), Some(&Value::Null));
    }

    #[test]
    fn test_quoted_tab_merges_titles_and_leaves_genres_missing() {
        let text = "tconst\ttitleType\tprimaryTitle\toriginalTitle\tisAdult\tstartYear\tendYear\truntimeMinutes\tgenres\n\
tt1\tmovie\t\"A\t\"A\t0\t1994\t\\N\t90\tDrama\n";
        let table = parse_tsv(text, &SourceSpec::title_basics("u")).unwrap();
        assert_eq!(table.get(0, "primaryTitle"), Some(&Value::text("A\tA")));
        assert_eq!(table.get(0, "originalTitle"), Some(&Value::text("0")));
        assert_eq!(table.get(0, "runtimeMinutes"), Some(&Value::text("Drama")));
        assert_eq!(table.get(0, "genres"), Some(&Value::Null));
    }

    #[test]
    fn test_extra_fields_are_source_unavailable() {
        let text = "tconst\taverageRating\tnumVotes\ntt1\t5.7\t10\tEXTRA\tMORE\n";
        let err = parse_tsv(text, &SourceSpec::title_ratings("u")).unwrap_err();
        assert!(matches!(err, EtlError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_parse_ratings_types() {
        let text = "tconst\taverageRating\tnumVotes\ntt1\t5.7\t1989\n";
        let table = parse_tsv(text, &SourceSpec::title_ratings("u")).unwrap();
        assert_eq!(table.get(0, "averageRating"), Some(&Value::Real(5.7)));
        assert_eq!(table.get(0, "numVotes"), Some(&Value::Integer(1989)));
    }

    #[test]
    fn test_unparseable_rating_is_source_unavailable() {
        let text = "tconst\taverageRating\tnumVotes\ntt1\tgreat\t10\n";
        let err = parse_tsv(text, &SourceSpec::title_ratings("u")).unwrap_err();
        assert!(matches!(err, EtlError::SourceUnavailable { .. }));
    }
}
