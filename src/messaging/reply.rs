use serde::{Deserialize, Serialize};

/// Terminal outcome reported by the worker.
///
/// Current workers send SUCCESS/ERROR; the aliases keep replies from
/// older pipeline builds (complete/incomplete) parseable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    #[serde(
        rename = "SUCCESS",
        alias = "success",
        alias = "Success",
        alias = "complete",
        alias = "COMPLETE"
    )]
    Success,
    #[serde(
        rename = "ERROR",
        alias = "error",
        alias = "Error",
        alias = "incomplete",
        alias = "INCOMPLETE"
    )]
    Error,
}

/// The outcome of one job, as published by a worker on the reply channel.
///
/// The field set varies with the worker API version, so every artifact
/// pointer is optional and individually meaningful, unknown fields are
/// ignored, and the legacy spellings are accepted as aliases. This struct
/// is applied to the job row and then kept only in raw form (on the job)
/// and in the correlation store for inspection — it is not persisted as
/// an entity of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReplyMessage {
    pub correlation_id: String,

    /// Identity of the job this reply belongs to, echoed back by the
    /// worker. This is the durable resolution key: unlike the in-memory
    /// correlation binding it survives a restart of this process.
    pub job_id: i64,

    pub job_status: ReplyStatus,

    #[serde(default)]
    pub error: Option<String>,

    /// Derived geometry artifact; its content gets fetched from object
    /// storage and stored on the job.
    #[serde(
        default,
        rename = "resultGeoJsonURL",
        alias = "resultGeoJsonS3URL",
        alias = "resultShapefileURL"
    )]
    pub result_geojson_url: Option<String>,

    /// Zipped shapefile artifact.
    #[serde(
        default,
        rename = "resultZippedShapefileURL",
        alias = "resultZippedShapefileS3URL",
        alias = "resultImageURL"
    )]
    pub result_archive_url: Option<String>,

    #[serde(
        default,
        rename = "superResolutionImageURL",
        alias = "superResolutionImageS3URL"
    )]
    pub super_resolution_image_url: Option<String>,

    #[serde(
        default,
        rename = "superResolutionTIFURL",
        alias = "superResolutionTIFS3URL"
    )]
    pub super_resolution_tif_url: Option<String>,

    #[serde(default)]
    pub bounds: Option<String>,
}
