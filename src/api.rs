//! HTTP surface
//!
//! Thin handlers over the engine, the capture history and the latest-wins
//! sampler. Everything here is glue; matching lives in the engine.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_scalar::{Scalar, Servable};

use crate::capture::{LoadedImage, PixelSource};
use crate::color::{Lab, Rgb};
use crate::engine::{Classification, ClassificationEngine, EngineConfig, Label};
use crate::error::AppError;
use crate::export;
use crate::history::{Capture, HistoryRecord, HistoryStore, Position};
use crate::notation::MunsellNotation;
use crate::sampler::Sampler;
use crate::swatch::{self, DEFAULT_SWATCH_SIZE};
use crate::table::{ReferenceEntry, TableInfo};

/// Uploaded images may be large photographs
const MAX_IMAGE_BYTES: usize = 32 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    engine: Arc<ClassificationEngine>,
    history: Arc<RwLock<HistoryStore>>,
    image: Arc<RwLock<Option<LoadedImage>>>,
    sampler: Arc<Sampler>,
}

impl AppState {
    /// Must be called inside a tokio runtime (starts the sampler task)
    pub fn new(engine: Arc<ClassificationEngine>) -> Self {
        Self {
            sampler: Arc::new(Sampler::spawn(engine.clone())),
            engine,
            history: Arc::new(RwLock::new(HistoryStore::new())),
            image: Arc::new(RwLock::new(None)),
        }
    }

    /// Resolve a request's pixel: explicit channels, hex, or a position in
    /// the loaded image
    async fn resolve_pixel(&self, input: &PixelInput) -> Result<(Rgb, Option<Position>), AppError> {
        if let Some(hex) = &input.hex {
            let pixel = Rgb::from_hex(hex)
                .ok_or_else(|| AppError::InvalidInput(format!("invalid hex color {hex:?}")))?;
            return Ok((pixel, None));
        }

        match (input.r, input.g, input.b) {
            (Some(r), Some(g), Some(b)) => return Ok((Rgb::from_clamped(r, g, b), None)),
            (None, None, None) => {}
            _ => {
                return Err(AppError::InvalidInput(
                    "r, g and b must be given together".to_string(),
                ))
            }
        }

        let (Some(x), Some(y)) = (input.x, input.y) else {
            return Err(AppError::InvalidInput(
                "expected r,g,b, hex, or an image position x,y".to_string(),
            ));
        };
        let image = self.image.read().await;
        let image = image.as_ref().ok_or(AppError::NoImage)?;
        let (pixel, position) = sample_image(image, x, y, input.view_width, input.view_height)?;
        Ok((pixel, Some(position)))
    }
}

/// Pixel under a position, in source pixels or in a scaled viewer
fn sample_image(
    image: &LoadedImage,
    x: f64,
    y: f64,
    view_width: Option<u32>,
    view_height: Option<u32>,
) -> Result<(Rgb, Position), AppError> {
    let source = match (view_width, view_height) {
        (Some(w), Some(h)) => image.view_to_source(x, y, w, h),
        (None, None) if x.is_finite() && y.is_finite() && x >= 0.0 && y >= 0.0 => {
            Some((x.floor() as u32, y.floor() as u32))
        }
        (None, None) => None,
        _ => {
            return Err(AppError::InvalidInput(
                "view_width and view_height must be given together".to_string(),
            ))
        }
    };

    let outside = || AppError::InvalidInput(format!("position ({x}, {y}) is outside the image"));
    let (sx, sy) = source.ok_or_else(outside)?;
    let pixel = image.pixel_at(sx, sy).ok_or_else(outside)?;
    Ok((pixel, Position { x: sx, y: sy }))
}

/// A pixel given directly or by position in the loaded image.
/// Channels outside 0..=255 are clamped.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PixelInput {
    pub r: Option<i64>,
    pub g: Option<i64>,
    pub b: Option<i64>,
    /// `#RRGGBB` or `RRGGBB`
    pub hex: Option<String>,
    /// Position in the loaded image
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Viewer size when `x`/`y` are viewer coordinates
    pub view_width: Option<u32>,
    pub view_height: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotationQuery {
    /// Notation such as `5R 4/6` or `N 5`
    pub notation: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SwatchQuery {
    pub notation: String,
    /// Edge length in pixels
    pub size: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ImagePixelQuery {
    pub x: f64,
    pub y: f64,
    pub view_width: Option<u32>,
    pub view_height: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TableResponse {
    pub table: TableInfo,
    pub config: EngineConfig,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotationResponse {
    pub entry: ReferenceEntry,
    /// Approximate display color under the configured white point
    pub display: Rgb,
    pub hex: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PixelSample {
    pub position: Position,
    pub label: Label,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CursorState {
    /// `None` until a submitted sample has been classified
    pub label: Option<Label>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HistoryRequest {
    #[serde(flatten)]
    pub pixel: PixelInput,
    pub note: Option<String>,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Munsell Picker API",
        description = "Classify display colors into Munsell notation and keep a capture log",
        version = "0.1.0"
    ),
    tags(
        (name = "Colors", description = "Classification and notation lookup"),
        (name = "Image", description = "Uploaded image sampling"),
        (name = "History", description = "Capture log and CSV export")
    ),
    paths(
        health,
        table_info,
        classify,
        notation,
        notation_swatch,
        upload_image,
        image_pixel,
        submit_cursor,
        cursor,
        history,
        append_history,
        clear_history,
        export_history
    ),
    components(schemas(
        Rgb,
        Lab,
        MunsellNotation,
        Classification,
        Label,
        HistoryRecord,
        PixelInput,
        HistoryRequest
    ))
)]
pub struct ApiDoc;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/table", get(table_info))
        .route("/classify", get(classify))
        .route("/notation", get(notation))
        .route("/notation/swatch.png", get(notation_swatch))
        .route(
            "/image",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
        .route("/image/pixel", get(image_pixel))
        .route("/cursor", get(cursor).post(submit_cursor))
        .route(
            "/history",
            get(history).post(append_history).delete(clear_history),
        )
        .route("/history/export.csv", get(export_history))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .route("/openapi.json", get(openapi_json))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = String)
    )
)]
async fn health() -> &'static str {
    "ok"
}

/// Get OpenAPI JSON specification
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Loaded table and engine settings
#[utoipa::path(
    get,
    path = "/table",
    tag = "Colors",
    responses(
        (status = 200, description = "Table metadata", body = TableResponse)
    )
)]
async fn table_info(State(state): State<AppState>) -> Json<TableResponse> {
    Json(TableResponse {
        table: state.engine.table().info(),
        config: *state.engine.config(),
    })
}

/// Classify a pixel
///
/// A failed match is reported as a `no match` label, not an error.
#[utoipa::path(
    get,
    path = "/classify",
    tag = "Colors",
    params(PixelInput),
    responses(
        (status = 200, description = "Classification label", body = Label),
        (status = 400, description = "Missing or malformed pixel"),
        (status = 404, description = "Position given but no image loaded")
    )
)]
async fn classify(
    State(state): State<AppState>,
    Query(input): Query<PixelInput>,
) -> Result<Json<Label>, AppError> {
    let (pixel, _) = state.resolve_pixel(&input).await?;
    Ok(Json(state.engine.label(pixel)))
}

fn lookup_entry(state: &AppState, text: &str) -> Result<ReferenceEntry, AppError> {
    let notation: MunsellNotation = text.parse().map_err(AppError::InvalidInput)?;
    state
        .engine
        .table()
        .lookup(&notation)
        .copied()
        .ok_or_else(|| AppError::UnknownNotation(notation.to_string()))
}

/// Look up a tabulated notation
#[utoipa::path(
    get,
    path = "/notation",
    tag = "Colors",
    params(NotationQuery),
    responses(
        (status = 200, description = "Reference entry", body = NotationResponse),
        (status = 400, description = "Unparseable notation"),
        (status = 404, description = "Notation not in the table")
    )
)]
async fn notation(
    State(state): State<AppState>,
    Query(query): Query<NotationQuery>,
) -> Result<Json<NotationResponse>, AppError> {
    let entry = lookup_entry(&state, &query.notation)?;
    let display = state.engine.converter().to_rgb(&entry.coordinate);
    Ok(Json(NotationResponse {
        entry,
        display,
        hex: display.to_hex(),
    }))
}

/// Solid swatch of a tabulated notation
#[utoipa::path(
    get,
    path = "/notation/swatch.png",
    tag = "Colors",
    params(SwatchQuery),
    responses(
        (status = 200, description = "Swatch image", content_type = "image/png"),
        (status = 400, description = "Unparseable notation or bad size"),
        (status = 404, description = "Notation not in the table")
    )
)]
async fn notation_swatch(
    State(state): State<AppState>,
    Query(query): Query<SwatchQuery>,
) -> Result<Response, AppError> {
    let entry = lookup_entry(&state, &query.notation)?;
    let display = state.engine.converter().to_rgb(&entry.coordinate);
    let png_data = swatch::render_swatch(display, query.size.unwrap_or(DEFAULT_SWATCH_SIZE))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        png_data,
    )
        .into_response())
}

/// Load an image for sampling
///
/// Replaces any previously loaded image.
#[utoipa::path(
    post,
    path = "/image",
    tag = "Image",
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Image loaded", body = ImageInfo),
        (status = 500, description = "Image could not be decoded")
    )
)]
async fn upload_image(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ImageInfo>, AppError> {
    let image = tokio::task::spawn_blocking(move || LoadedImage::decode(&body))
        .await
        .map_err(|e| AppError::ImageProcessing(format!("Decode task failed: {}", e)))??;

    let (width, height) = image.dimensions();
    *state.image.write().await = Some(image);
    Ok(Json(ImageInfo { width, height }))
}

/// Classify the pixel under a position in the loaded image
#[utoipa::path(
    get,
    path = "/image/pixel",
    tag = "Image",
    params(ImagePixelQuery),
    responses(
        (status = 200, description = "Sampled pixel and label", body = PixelSample),
        (status = 400, description = "Position outside the image"),
        (status = 404, description = "No image loaded")
    )
)]
async fn image_pixel(
    State(state): State<AppState>,
    Query(query): Query<ImagePixelQuery>,
) -> Result<Json<PixelSample>, AppError> {
    let (pixel, position) = {
        let image = state.image.read().await;
        let image = image.as_ref().ok_or(AppError::NoImage)?;
        sample_image(image, query.x, query.y, query.view_width, query.view_height)?
    };

    Ok(Json(PixelSample {
        position,
        label: state.engine.label(pixel),
    }))
}

/// Submit a cursor sample
///
/// Only the newest pending sample is classified.
#[utoipa::path(
    post,
    path = "/cursor",
    tag = "Colors",
    request_body = PixelInput,
    responses(
        (status = 202, description = "Sample queued"),
        (status = 400, description = "Missing or malformed pixel")
    )
)]
async fn submit_cursor(
    State(state): State<AppState>,
    Json(input): Json<PixelInput>,
) -> Result<StatusCode, AppError> {
    let (pixel, _) = state.resolve_pixel(&input).await?;
    state.sampler.submit(pixel);
    Ok(StatusCode::ACCEPTED)
}

/// Latest cursor label
#[utoipa::path(
    get,
    path = "/cursor",
    tag = "Colors",
    responses(
        (status = 200, description = "Most recent label", body = CursorState)
    )
)]
async fn cursor(State(state): State<AppState>) -> Json<CursorState> {
    Json(CursorState {
        label: state.sampler.latest(),
    })
}

/// List captured colors in capture order
#[utoipa::path(
    get,
    path = "/history",
    tag = "History",
    responses(
        (status = 200, description = "Capture log", body = Vec<HistoryRecord>)
    )
)]
async fn history(State(state): State<AppState>) -> Json<Vec<HistoryRecord>> {
    Json(state.history.read().await.all().to_vec())
}

/// Classify a pixel and append it to the log
#[utoipa::path(
    post,
    path = "/history",
    tag = "History",
    request_body = HistoryRequest,
    responses(
        (status = 201, description = "Appended record", body = HistoryRecord),
        (status = 400, description = "Missing or malformed pixel"),
        (status = 503, description = "No reference data")
    )
)]
async fn append_history(
    State(state): State<AppState>,
    Json(request): Json<HistoryRequest>,
) -> Result<(StatusCode, Json<HistoryRecord>), AppError> {
    let (pixel, position) = state.resolve_pixel(&request.pixel).await?;
    let classification = state.engine.classify(pixel)?;

    let mut history = state.history.write().await;
    let record = history.append(Capture {
        pixel,
        notation: classification.notation,
        position,
        note: request.note,
    });
    tracing::info!("Captured {} as {}", pixel.to_hex(), classification.label);

    Ok((StatusCode::CREATED, Json(record.clone())))
}

/// Clear the log
#[utoipa::path(
    delete,
    path = "/history",
    tag = "History",
    responses(
        (status = 204, description = "Log cleared")
    )
)]
async fn clear_history(State(state): State<AppState>) -> StatusCode {
    state.history.write().await.clear();
    StatusCode::NO_CONTENT
}

/// Export the log as CSV
#[utoipa::path(
    get,
    path = "/history/export.csv",
    tag = "History",
    responses(
        (status = 200, description = "CSV export", content_type = "text/csv")
    )
)]
async fn export_history(State(state): State<AppState>) -> Result<Response, AppError> {
    let csv = export::to_csv(state.history.read().await.all())?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export::default_file_name(Utc::now())
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BUILTIN_TABLE;
    use crate::table::{self, ReferenceTable};
    use image::RgbImage;

    fn builtin_state() -> AppState {
        let table = table::load("builtin", BUILTIN_TABLE).unwrap();
        AppState::new(Arc::new(ClassificationEngine::new(
            Arc::new(table),
            EngineConfig::default(),
        )))
    }

    fn rgb_input(r: i64, g: i64, b: i64) -> PixelInput {
        PixelInput {
            r: Some(r),
            g: Some(g),
            b: Some(b),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_classify_gray() {
        let state = builtin_state();
        let Json(label) = classify(State(state), Query(rgb_input(128, 128, 128)))
            .await
            .unwrap();
        assert!(label.text().starts_with("N "), "{}", label.text());
    }

    #[tokio::test]
    async fn test_classify_clamps_channels() {
        let state = builtin_state();
        let Json(label) = classify(State(state), Query(rgb_input(300, -20, 0)))
            .await
            .unwrap();
        assert_eq!(label.classification().unwrap().pixel, Rgb::new(255, 0, 0));
    }

    #[tokio::test]
    async fn test_classify_hex_and_bad_input() {
        let state = builtin_state();
        let input = PixelInput {
            hex: Some("#ffffff".to_string()),
            ..Default::default()
        };
        let Json(label) = classify(State(state.clone()), Query(input)).await.unwrap();
        assert_eq!(label.text(), "N 10");

        let partial = PixelInput {
            r: Some(1),
            ..Default::default()
        };
        let err = classify(State(state.clone()), Query(partial)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let position = PixelInput {
            x: Some(1.0),
            y: Some(1.0),
            ..Default::default()
        };
        let err = classify(State(state), Query(position)).await.unwrap_err();
        assert!(matches!(err, AppError::NoImage));
    }

    #[tokio::test]
    async fn test_notation_lookup() {
        let state = builtin_state();
        let Json(found) = notation(
            State(state.clone()),
            Query(NotationQuery {
                notation: "N 5".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(found.entry.notation.to_string(), "N 5");
        assert!(found.display.r.abs_diff(found.display.g) <= 1, "{}", found.hex);

        let missing = notation(
            State(state.clone()),
            Query(NotationQuery {
                notation: "5R 9/40".to_string(),
            }),
        )
        .await;
        assert!(matches!(missing, Err(AppError::UnknownNotation(_))));

        let garbage = notation(
            State(state),
            Query(NotationQuery {
                notation: "red".to_string(),
            }),
        )
        .await;
        assert!(matches!(garbage, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_image_sampling() {
        let state = builtin_state();
        let img = RgbImage::from_fn(2, 2, |x, _| {
            if x == 0 {
                image::Rgb([128, 128, 128])
            } else {
                image::Rgb([255, 0, 0])
            }
        });
        *state.image.write().await = Some(LoadedImage::from_rgb_image(img));

        let Json(sample) = image_pixel(
            State(state.clone()),
            Query(ImagePixelQuery {
                x: 1.0,
                y: 0.0,
                view_width: None,
                view_height: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(sample.position, Position { x: 1, y: 0 });
        assert_eq!(sample.label.classification().unwrap().pixel, Rgb::new(255, 0, 0));

        let outside = image_pixel(
            State(state),
            Query(ImagePixelQuery {
                x: 5.0,
                y: 0.0,
                view_width: None,
                view_height: None,
            }),
        )
        .await;
        assert!(matches!(outside, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_history_flow() {
        let state = builtin_state();
        for ((r, g, b), note) in [((200, 50, 50), None), ((128, 128, 128), Some("wall"))] {
            let request = HistoryRequest {
                pixel: rgb_input(r, g, b),
                note: note.map(str::to_string),
            };
            let (status, _) = append_history(State(state.clone()), Json(request))
                .await
                .unwrap();
            assert_eq!(status, StatusCode::CREATED);
        }

        let Json(records) = history(State(state.clone())).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, 1);
        assert_eq!(records[1].note.as_deref(), Some("wall"));
        assert!(records[1].notation.is_neutral());

        let response = export_history(State(state.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );

        assert_eq!(clear_history(State(state.clone())).await, StatusCode::NO_CONTENT);
        let Json(records) = history(State(state)).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_history_without_table_is_unavailable() {
        let state = AppState::new(Arc::new(ClassificationEngine::new(
            Arc::new(ReferenceTable::empty("none")),
            EngineConfig::default(),
        )));
        let request = HistoryRequest {
            pixel: rgb_input(1, 2, 3),
            note: None,
        };
        let err = append_history(State(state), Json(request)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_cursor_reports_latest() {
        let state = builtin_state();
        let status = submit_cursor(State(state.clone()), Json(rgb_input(255, 255, 255)))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);

        let mut rx = state.sampler.subscribe();
        rx.wait_for(|label| label.is_some()).await.unwrap();
        let Json(current) = cursor(State(state)).await;
        assert_eq!(current.label.unwrap().text(), "N 10");
    }

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/classify", "/history", "/history/export.csv", "/notation/swatch.png"] {
            assert!(doc.paths.paths.contains_key(path), "{}", path);
        }
    }
}
