use std::collections::HashMap;
use std::convert::Infallible;

use bytes::Bytes;
use http::HeaderMap;
use serde::Deserialize;

use crate::error::RunError;

pub const ARGS_HEADER: &str = "x-runlet-args";
pub const ENV_HEADER: &str = "x-runlet-env";
pub const ENTRYPOINT_HEADER: &str = "x-runlet-entrypoint";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Code,
    Files,
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub code: Option<String>,
    pub files: Option<HashMap<String, Vec<u8>>>,
    pub entrypoint: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct JsonBody {
    files: Option<HashMap<String, String>>,
}

impl RunRequest {
    pub fn mode(&self) -> RunMode {
        if self.files.is_some() {
            RunMode::Files
        } else {
            RunMode::Code
        }
    }

    pub async fn from_parts(
        body: Bytes,
        content_type: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<Self, RunError> {
        let declared = content_type.map(str::trim).filter(|value| !value.is_empty());
        let (code, files) = match declared {
            Some(value) if is_mimetype(value, "multipart/form-data") => {
                (None, Some(decode_multipart(body, value).await?))
            }
            Some(value) if is_mimetype(value, "application/json") => {
                (None, Some(decode_json_files(&body)?))
            }
            Some(value) if is_mimetype(value, "application/x-www-form-urlencoded") => {
                (Some(decode_form_code(&body)?), None)
            }
            Some(value) if is_mimetype(value, "text/plain") => {
                (Some(decode_raw_code(&body)?), None)
            }
            None => (Some(decode_raw_code(&body)?), None),
            Some(_) => return Err(RunError::UnsupportedContentType),
        };

        let args = header_str(headers, ARGS_HEADER)
            .map(args_from_header)
            .unwrap_or_default();
        let env = header_str(headers, ENV_HEADER)
            .map(env_from_header)
            .unwrap_or_default();
        let entrypoint = header_str(headers, ENTRYPOINT_HEADER).map(str::to_owned);

        Ok(Self {
            code,
            files,
            entrypoint,
            args,
            env,
        })
    }
}

fn is_mimetype(declared: &str, expected: &str) -> bool {
    declared
        .split(';')
        .next()
        .unwrap_or(declared)
        .trim()
        .eq_ignore_ascii_case(expected)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn args_from_header(value: &str) -> Vec<String> {
    value.split(' ').map(str::to_owned).collect()
}

// Splits assignments on the first `=` only; values containing spaces are
// unrepresentable in this header encoding.
pub fn env_from_header(value: &str) -> HashMap<String, String> {
    value
        .split(' ')
        .filter_map(|assignment| assignment.split_once('='))
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

fn decode_raw_code(body: &Bytes) -> Result<String, RunError> {
    if body.is_empty() {
        return Err(RunError::CodeNotFound);
    }
    let code = std::str::from_utf8(body).map_err(|_| RunError::InvalidUtf8)?;
    Ok(code.to_owned())
}

// The first field name is the code; field values are ignored.
fn decode_form_code(body: &Bytes) -> Result<String, RunError> {
    url::form_urlencoded::parse(body)
        .next()
        .map(|(name, _)| name.into_owned())
        .ok_or(RunError::CodeNotFound)
}

fn decode_json_files(body: &Bytes) -> Result<HashMap<String, Vec<u8>>, RunError> {
    let parsed: JsonBody = serde_json::from_slice(body).map_err(|_| RunError::IncorrectJson)?;
    let files = parsed.files.ok_or(RunError::IncorrectJson)?;
    if files.is_empty() {
        return Err(RunError::CodeNotFound);
    }
    Ok(files
        .into_iter()
        .map(|(filepath, content)| (filepath, content.into_bytes()))
        .collect())
}

async fn decode_multipart(
    body: Bytes,
    content_type: &str,
) -> Result<HashMap<String, Vec<u8>>, RunError> {
    let boundary = multer::parse_boundary(content_type).map_err(|_| RunError::InvalidMultipart)?;
    let stream = futures_util::stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut files = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| RunError::InvalidMultipart)?
    {
        let filepath = field
            .name()
            .or_else(|| field.file_name())
            .map(str::to_owned)
            .ok_or(RunError::InvalidMultipart)?;
        let content = field
            .bytes()
            .await
            .map_err(|_| RunError::InvalidMultipart)?;
        files.insert(filepath, content.to_vec());
    }
    if files.is_empty() {
        return Err(RunError::CodeNotFound);
    }
    Ok(files)
}
