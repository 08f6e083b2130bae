/// Table and column names shared by every stage of the pipeline.
/// These are the names the stages hand off through the store, so they must stay stable.

// Snapshot tables, one per stage output
pub const MERGED_DATA_TABLE: &str = "merged_data";
pub const IMPUTED_DATA_TABLE: &str = "imputed_data";
pub const TRANSFORMED_DATA_TABLE: &str = "transformed_data";
pub const DEDUPED_DATA_TABLE: &str = "deduped_data";

// Source column names
pub const TCONST: &str = "tconst";
pub const TITLE_TYPE: &str = "titleType";
pub const PRIMARY_TITLE: &str = "primaryTitle";
pub const ORIGINAL_TITLE: &str = "originalTitle";
pub const IS_ADULT: &str = "isAdult";
pub const START_YEAR: &str = "startYear";
pub const END_YEAR: &str = "endYear";
pub const RUNTIME_MINUTES: &str = "runtimeMinutes";
pub const GENRES: &str = "genres";
pub const AVERAGE_RATING: &str = "averageRating";
pub const NUM_VOTES: &str = "numVotes";

/// Literal the source files use for "value unknown".
pub const SENTINEL: &str = "\\N";

/// Declared field order of a merged record.
pub const RECORD_FIELDS: [&str; 11] = [
    TCONST,
    TITLE_TYPE,
    PRIMARY_TITLE,
    ORIGINAL_TITLE,
    IS_ADULT,
    START_YEAR,
    END_YEAR,
    RUNTIME_MINUTES,
    GENRES,
    AVERAGE_RATING,
    NUM_VOTES,
];

/// Fields that slide one position right when `genres` is missing.
/// Each entry takes the value of the entry before it; the first entry is only a source.
pub const SHIFT_CHAIN: [&str; 7] = [
    PRIMARY_TITLE,
    ORIGINAL_TITLE,
    IS_ADULT,
    START_YEAR,
    END_YEAR,
    RUNTIME_MINUTES,
    GENRES,
];

/// Columns stored as sentinel-encoded strings until the type normalizer runs.
pub const NUMERIC_FIELDS: [&str; 3] = [START_YEAR, END_YEAR, RUNTIME_MINUTES];

// Workflow step names
pub const STEP_DB_CONNECTION: &str = "db_connection";
pub const STEP_EXTRACT: &str = "extract_data";
pub const STEP_IMPUTE: &str = "impute_values";
pub const STEP_TRANSFORM: &str = "transform_datatypes";
pub const STEP_DEDUPE: &str = "dedupe_tconst";

/// All step names in execution order
pub fn get_step_names() -> Vec<&'static str> {
    vec![
        STEP_DB_CONNECTION,
        STEP_EXTRACT,
        STEP_IMPUTE,
        STEP_TRANSFORM,
        STEP_DEDUPE,
    ]
}
