use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Storage backend unreachable: {message}")]
    Connection { message: String },

    #[error("Source '{source_name}' unavailable: {message}")]
    SourceUnavailable { source_name: String, message: String },

    #[error("Cannot coerce value {value:?} in column '{column}' (row {row}) to an integer")]
    TypeCoercion {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Failed to write '{sink}': {message}")]
    SinkWrite { sink: String, message: String },

    #[error("Failed to read table '{table}': {message}")]
    TableRead { table: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    pub fn source_unavailable(source_name: &str, message: impl ToString) -> Self {
        EtlError::SourceUnavailable {
            source_name: source_name.to_string(),
            message: message.to_string(),
        }
    }

    pub fn sink_write(sink: impl ToString, message: impl ToString) -> Self {
        EtlError::SinkWrite {
            sink: sink.to_string(),
            message: message.to_string(),
        }
    }

    pub fn table_read(table: &str, message: impl ToString) -> Self {
        EtlError::TableRead {
            table: table.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
