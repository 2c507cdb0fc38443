//! CSV records with header mapping onto lead columns.

use crate::errors::AppError;
use crate::models::Lead;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Column names tried, in order, for a record's phone number.
pub const PHONE_ALIASES: &[&str] = &[
    "phone",
    "Phone",
    "phone_number",
    "PhoneNumber",
    "primary_phone",
    "PrimaryPhone",
    "phone_home",
];

/// Column names tried, in order, for a record's TrustedForm certificate URL.
pub const CERT_ALIASES: &[&str] = &[
    "certificate_url",
    "certificateUrl",
    "Certificate_URL",
    "trustedform_url",
    "TrustedForm",
    "trusted_form_cert_url",
];

pub const EMAIL_ALIASES: &[&str] = &["email", "Email", "email_address", "EmailAddress"];

/// One CSV row as ordered `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct CsvRecord {
    fields: Vec<(String, String)>,
}

impl CsvRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the first column named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Replaces the value of `name`, or appends the column.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Map<String, Value>> for CsvRecord {
    fn from(map: Map<String, Value>) -> Self {
        let fields = map
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k, value)
            })
            .collect();
        Self { fields }
    }
}

impl Serialize for CsvRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.fields.iter().map(|(k, v)| (k, v)))
    }
}

/// First non-blank value among `aliases`, in alias order.
pub fn lookup_field<'a>(record: &'a CsvRecord, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .filter_map(|alias| record.get(alias))
        .map(str::trim)
        .find(|v| !v.is_empty())
}

// ============ Column Mapping ============

struct ColumnMapping {
    db_column: &'static str,
    variations: &'static [&'static str],
    /// Higher is a more specific column.
    priority: u32,
}

const COLUMN_MAPPINGS: &[ColumnMapping] = &[
    ColumnMapping {
        db_column: "first_name",
        variations: &["first_name", "firstname", "first name", "fname", "f_name", "given_name", "givenname"],
        priority: 10,
    },
    ColumnMapping {
        db_column: "last_name",
        variations: &["last_name", "lastname", "last name", "lname", "l_name", "surname", "family_name", "familyname"],
        priority: 10,
    },
    ColumnMapping {
        db_column: "email",
        variations: &["email", "email_address", "emailaddress", "e_mail", "e-mail", "mail"],
        priority: 10,
    },
    ColumnMapping {
        db_column: "phone",
        variations: &[
            "phone", "phone_number", "phonenumber", "primary_phone", "mobile", "cell", "telephone",
            "tel", "phone_home", "home_phone",
        ],
        priority: 10,
    },
    ColumnMapping {
        db_column: "address",
        variations: &["address", "street_address", "streetaddress", "street", "addr", "address1", "address_1"],
        priority: 8,
    },
    ColumnMapping {
        db_column: "city",
        variations: &["city", "town", "municipality"],
        priority: 8,
    },
    ColumnMapping {
        db_column: "state",
        variations: &["state", "province", "region", "st"],
        priority: 8,
    },
    ColumnMapping {
        db_column: "zip_code",
        variations: &["zip", "zip_code", "zipcode", "postal_code", "postalcode", "postcode"],
        priority: 8,
    },
    ColumnMapping {
        db_column: "campaign_id",
        variations: &["campaign_id", "campaignid", "campaign", "camp_id"],
        priority: 6,
    },
    ColumnMapping {
        db_column: "cadence_id",
        variations: &["cadence_id", "cadenceid", "cadence", "sequence_id"],
        priority: 6,
    },
    ColumnMapping {
        db_column: "list_id",
        variations: &["list_id", "listid", "list", "source_list"],
        priority: 6,
    },
    ColumnMapping {
        db_column: "trusted_form_cert_url",
        variations: &["trusted_form_cert_url", "trustedform", "cert_url", "certificate_url"],
        priority: 4,
    },
    ColumnMapping {
        db_column: "source",
        variations: &["source", "traffic_source", "lead_source", "origin"],
        priority: 4,
    },
];

/// Partial matches must score above this to be used.
const PARTIAL_MATCH_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Partial { score: f64 },
    Unmapped,
}

/// How one input header was mapped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderMapping {
    pub original: String,
    pub mapped: String,
    #[serde(flatten)]
    pub kind: MatchKind,
}

impl HeaderMapping {
    pub fn describe(&self) -> String {
        match &self.kind {
            MatchKind::Exact => format!("Exact match: \"{}\" -> {}", self.original, self.mapped),
            MatchKind::Partial { score } => format!(
                "Partial match: \"{}\" -> {} (score: {:.1})",
                self.original, self.mapped, score
            ),
            MatchKind::Unmapped if self.mapped != self.original => format!(
                "No mapping found: \"{}\" kept as {}",
                self.original, self.mapped
            ),
            MatchKind::Unmapped => format!("No mapping found: \"{}\" kept as-is", self.original),
        }
    }
}

fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Maps headers onto lead columns: exact matches first, then the best
/// partial match above the threshold. Each lead column is used at most once;
/// unmatched headers are kept as-is, suffixed (`phone_2`) when the name is
/// already taken so every mapped name is unique.
pub fn map_headers(headers: &[String]) -> Vec<HeaderMapping> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut used: Vec<&'static str> = Vec::new();
    let mut mapped: Vec<Option<HeaderMapping>> = vec![None; headers.len()];

    for (index, header) in headers.iter().enumerate() {
        let exact = COLUMN_MAPPINGS.iter().find(|m| {
            !used.contains(&m.db_column)
                && m.variations
                    .iter()
                    .any(|v| normalize_header(v) == normalized[index])
        });
        if let Some(mapping) = exact {
            used.push(mapping.db_column);
            mapped[index] = Some(HeaderMapping {
                original: header.clone(),
                mapped: mapping.db_column.to_string(),
                kind: MatchKind::Exact,
            });
        }
    }

    for (index, header) in headers.iter().enumerate() {
        if mapped[index].is_some() {
            continue;
        }
        let candidate = &normalized[index];
        let mut best: Option<(&ColumnMapping, f64)> = None;

        for mapping in COLUMN_MAPPINGS.iter().filter(|m| !used.contains(&m.db_column)) {
            for variation in mapping.variations {
                let variation = normalize_header(variation);
                if candidate.is_empty()
                    || !(candidate.contains(&variation) || variation.contains(candidate.as_str()))
                {
                    continue;
                }
                let shorter = candidate.len().min(variation.len()) as f64;
                let longer = candidate.len().max(variation.len()) as f64;
                let score = mapping.priority as f64 * (shorter / longer);
                if best.map_or(true, |(_, b)| score > b) {
                    best = Some((mapping, score));
                }
            }
        }

        mapped[index] = Some(match best {
            Some((mapping, score)) if score > PARTIAL_MATCH_THRESHOLD => {
                used.push(mapping.db_column);
                HeaderMapping {
                    original: header.clone(),
                    mapped: mapping.db_column.to_string(),
                    kind: MatchKind::Partial { score },
                }
            }
            _ => HeaderMapping {
                original: header.clone(),
                mapped: header.clone(),
                kind: MatchKind::Unmapped,
            },
        });
    }

    let mut mappings: Vec<HeaderMapping> = mapped.into_iter().flatten().collect();
    let mut taken: Vec<String> = mappings
        .iter()
        .filter(|m| m.kind != MatchKind::Unmapped)
        .map(|m| m.mapped.clone())
        .collect();
    for mapping in mappings.iter_mut().filter(|m| m.kind == MatchKind::Unmapped) {
        mapping.mapped = unique_name(&mapping.mapped, &taken);
        taken.push(mapping.mapped.clone());
    }
    mappings
}

fn unique_name(name: &str, taken: &[String]) -> String {
    if !taken.iter().any(|t| t == name) {
        return name.to_string();
    }
    (2..)
        .map(|n| format!("{}_{}", name, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Parsed CSV body.
#[derive(Debug, Clone)]
pub struct ParsedCsv {
    pub records: Vec<CsvRecord>,
    pub mappings: Vec<HeaderMapping>,
}

/// Parses CSV text whose first row is a header, mapping headers onto lead
/// columns. Short rows are padded with empty values.
pub fn parse_csv(text: &str) -> Result<ParsedCsv, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mappings = map_headers(&headers);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.iter().all(|v| v.is_empty()) {
            continue;
        }
        let mut record = CsvRecord::new();
        for (index, mapping) in mappings.iter().enumerate() {
            record
                .fields
                .push((mapping.mapped.clone(), row.get(index).unwrap_or("").to_string()));
        }
        records.push(record);
    }

    tracing::debug!("Parsed {} CSV records with {} columns", records.len(), headers.len());
    Ok(ParsedCsv { records, mappings })
}

fn quoted_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, AppError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::InternalError(format!("CSV writer failed: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| AppError::InternalError(format!("CSV output is not UTF-8: {}", e)))
}

/// Serializes records with the first record's columns as the header. Every
/// field is double-quoted.
pub fn records_to_csv(records: &[CsvRecord]) -> Result<String, AppError> {
    let Some(first) = records.first() else {
        return Ok(String::new());
    };
    let headers: Vec<&str> = first.columns().collect();

    let mut writer = quoted_writer();
    writer.write_record(&headers)?;
    for record in records {
        writer.write_record(headers.iter().map(|h| record.get(h).unwrap_or("")))?;
    }
    finish(writer)
}

pub const EXPORT_COLUMNS: &[&str] = &[
    "id",
    "phone",
    "email",
    "first_name",
    "last_name",
    "state",
    "zip_code",
    "list_id",
    "campaign_id",
    "bid_amount",
    "status",
    "policy_status",
    "created_at",
];

/// Stored leads as an export CSV with [`EXPORT_COLUMNS`].
pub fn leads_to_csv(leads: &[Lead]) -> Result<String, AppError> {
    let mut writer = quoted_writer();
    writer.write_record(EXPORT_COLUMNS)?;

    for lead in leads {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        writer.write_record([
            lead.id.to_string(),
            lead.phone.clone(),
            opt(&lead.email),
            opt(&lead.first_name),
            opt(&lead.last_name),
            opt(&lead.state),
            opt(&lead.zip_code),
            opt(&lead.list_id),
            opt(&lead.campaign_id),
            lead.bid_amount
                .as_ref()
                .map(|b| b.to_string())
                .unwrap_or_default(),
            lead.status.clone(),
            opt(&lead.policy_status),
            lead.created_at.to_rfc3339(),
        ])?;
    }
    finish(writer)
}
