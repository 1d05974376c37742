use crate::AppState;
use crate::auth::Principal;
use crate::error::ApiError;
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use cirrus_cache::FileRecord;
use cirrus_library::analytics::{self, Summary};
use cirrus_library::{Listing, list_folder, ops, parse_path};
use cirrus_storage::LogicalPath;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::io;
use time::format_description::well_known::Rfc3339;
use tokio_util::io::{ReaderStream, StreamReader};

type HandlerResult<T> = std::result::Result<T, ApiError>;

const KIB: f64 = 1024.0;

#[derive(Debug, Default, Deserialize)]
pub struct FolderQuery {
    #[serde(default)]
    folder: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    old_path: String,
    new_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    #[serde(default)]
    folder_path: String,
    folder_name: String,
}

/// One row of a folder listing as the web client expects it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingEntry {
    name: String,
    is_folder: bool,
    /// Kilobytes with two decimals.
    size: String,
    /// RFC 3339 modification time.
    time: String,
}
impl From<Listing> for ListingEntry {
    fn from(listing: Listing) -> Self {
        let kib = match listing.is_folder {
            true => 0.0,
            false => listing.size as f64 / KIB,
        };
        Self {
            size: format!("{kib:.2}"),
            time: listing.modified.format(&Rfc3339).unwrap_or_default(),
            name: listing.name,
            is_folder: listing.is_folder,
        }
    }
}

pub async fn health() -> &'static str {
    "OK"
}

/// Stores the multipart `file` field inside `folderPath`.
///
/// The file is streamed straight to disk when `folderPath` arrives first,
/// otherwise it has to be held in memory until the folder is known.
pub async fn upload(
    State(state): State<AppState>,
    Principal(owner): Principal,
    mut multipart: Multipart,
) -> HandlerResult<Response> {
    let mut folder: Option<LogicalPath> = None;
    let mut buffered: Option<(String, Bytes)> = None;
    let mut stored: Option<FileRecord> = None;
    while let Some(field) = multipart.next_field().await.map_err(|_| ApiError::BadRequest("malformed multipart body"))? {
        match field.name() {
            Some("folderPath") => {
                let raw = field.text().await.map_err(|_| ApiError::BadRequest("malformed multipart body"))?;
                folder = Some(parse_path(&raw)?);
            },
            Some("file") if stored.is_none() && buffered.is_none() => {
                let name = field.file_name().unwrap_or_default().to_string();
                match &folder {
                    Some(folder) => {
                        let body = StreamReader::new(Box::pin(field.map_err(io::Error::other)));
                        let record = ops::upload(&state.backend, &state.cache, &owner, folder, &name, body).await?;
                        stored = Some(record);
                    },
                    None => {
                        let bytes = field.bytes().await.map_err(|_| ApiError::BadRequest("malformed multipart body"))?;
                        buffered = Some((name, bytes));
                    },
                }
            },
            _ => {},
        }
    }
    if let Some((name, bytes)) = buffered {
        let folder = folder.unwrap_or_default();
        let record = ops::upload(&state.backend, &state.cache, &owner, &folder, &name, &bytes[..]).await?;
        stored = Some(record);
    }
    let record = stored.ok_or(ApiError::BadRequest("no file uploaded"))?;

    let mut response = "File uploaded successfully!".into_response();
    if let Some(base) = &state.public_base_url
        && let Ok(location) = HeaderValue::from_str(&record.public_url(base))
    {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

pub async fn list_files(
    State(state): State<AppState>,
    Principal(owner): Principal,
    Query(query): Query<FolderQuery>,
) -> HandlerResult<Json<Vec<ListingEntry>>> {
    let folder = parse_path(&query.folder)?;
    let listing = list_folder(&state.backend, &state.cache, &owner, &folder).await?;
    Ok(Json(listing.into_iter().map(ListingEntry::from).collect()))
}

/// Makes a file name safe to put in a quoted header parameter.
fn disposition_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect()
}

pub async fn download(
    State(state): State<AppState>,
    Principal(owner): Principal,
    Path(raw): Path<String>,
) -> HandlerResult<Response> {
    let path = parse_path(&raw)?;
    let file = ops::download(&state.backend, &owner, &path).await?;
    let body = Body::from_stream(ReaderStream::new(file.reader));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type),
            (header::CONTENT_LENGTH, file.size.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", disposition_name(&file.name))),
        ],
        body,
    )
        .into_response())
}

pub async fn rename(
    State(state): State<AppState>,
    Principal(owner): Principal,
    Json(request): Json<RenameRequest>,
) -> HandlerResult<&'static str> {
    let from = parse_path(&request.old_path)?;
    let to = parse_path(&request.new_path)?;
    ops::rename(&state.backend, &state.cache, &owner, &from, &to).await?;
    Ok("Renamed successfully!")
}

pub async fn delete(
    State(state): State<AppState>,
    Principal(owner): Principal,
    Path(raw): Path<String>,
) -> HandlerResult<&'static str> {
    let path = parse_path(&raw)?;
    ops::delete(&state.backend, &state.cache, &owner, &path).await?;
    Ok("File deleted successfully!")
}

pub async fn create_folder(
    State(state): State<AppState>,
    Principal(owner): Principal,
    Json(request): Json<CreateFolderRequest>,
) -> HandlerResult<&'static str> {
    let parent = parse_path(&request.folder_path)?;
    ops::create_folder(&state.backend, &owner, &parent, &request.folder_name).await?;
    Ok("Folder created successfully!")
}

pub async fn folder_analytics(
    State(state): State<AppState>,
    Principal(owner): Principal,
    Query(query): Query<FolderQuery>,
) -> HandlerResult<Json<Summary>> {
    let folder = parse_path(&query.folder)?;
    let summary = analytics::summarize(&state.cache, state.summarizer.as_ref(), &owner, &folder).await?;
    Ok(Json(summary))
}
