use axum::extract::Multipart;
use time::Date;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    analyzer::{Language, MealAnalyzer},
    dto::{check_meal_time, UploadForm, UploadedFile},
};
use crate::{
    dates::parse_iso_date,
    error::{ApiError, FieldErrors},
    nutrition::MealAnalysis,
    storage::{dated_key, ext_from_mime, StorageClient},
};

/// What an analyze endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Audio,
}

impl UploadKind {
    pub fn field(self) -> &'static str {
        match self {
            UploadKind::Image => "image",
            UploadKind::Audio => "audio",
        }
    }

    fn key_prefix(self) -> &'static str {
        match self {
            UploadKind::Image => "meals",
            UploadKind::Audio => "meals/audio",
        }
    }

    fn accepts(self, content_type: &str) -> bool {
        let top = match self {
            UploadKind::Image => "image/",
            UploadKind::Audio => "audio/",
        };
        content_type.starts_with(top) || (self == UploadKind::Audio && content_type == "video/webm")
    }
}

/// Explicit form value first, then `Accept-Language`, then `fallback`.
pub fn resolve_language(explicit: Option<&str>, accept: Option<&str>, fallback: Language) -> Language {
    explicit
        .and_then(Language::from_tag)
        .or_else(|| accept.and_then(Language::from_accept_language))
        .unwrap_or(fallback)
}

/// Reads the file field for `kind` plus `meal_date`, `meal_time` and
/// `language` from a multipart body.
pub async fn read_upload(mut mp: Multipart, kind: UploadKind) -> Result<(UploadedFile, UploadForm), ApiError> {
    let mut form = UploadForm::default();
    let mut upload: Option<UploadedFile> = None;
    let mut errors = FieldErrors::default();

    loop {
        let field = match mp.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "malformed multipart body");
                return Err(ApiError::bad_request("Invalid multipart body"));
            }
        };
        let name = field.name().unwrap_or_default().to_string();

        if name == kind.field() {
            let content_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| "application/octet-stream".into());
            let file_name = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|_| ApiError::bad_request("Invalid multipart body"))?;
            let file_name = file_name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| {
                format!("upload.{}", ext_from_mime(&content_type).unwrap_or("bin"))
            });
            upload = Some(UploadedFile {
                file_name,
                content_type,
                bytes,
            });
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|_| ApiError::bad_request("Invalid multipart body"))?;
        let text = text.trim();
        match name.as_str() {
            "meal_date" if !text.is_empty() => match parse_iso_date(text) {
                Some(d) => form.meal_date = Some(d),
                None => errors.add(
                    "meal_date",
                    "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.",
                ),
            },
            "meal_time" => form.meal_time = check_meal_time(&mut errors, Some(text)),
            "language" if !text.is_empty() => form.language = Some(text.to_string()),
            _ => {}
        }
    }

    let file = match upload {
        Some(f) if f.bytes.is_empty() => {
            errors.add(kind.field(), "The submitted file is empty.");
            None
        }
        Some(f) if !kind.accepts(&f.content_type) => {
            errors.add(kind.field(), format!("Unsupported file type \"{}\".", f.content_type));
            None
        }
        Some(f) => Some(f),
        None => {
            errors.add(kind.field(), "No file was submitted.");
            None
        }
    };

    errors.into_result()?;
    let file = file.ok_or_else(|| ApiError::field(kind.field(), "No file was submitted."))?;
    Ok((file, form))
}

/// Stores the upload, then analyzes it. The stored object is removed again
/// when analysis fails.
pub async fn store_and_analyze(
    storage: &dyn StorageClient,
    analyzer: &dyn MealAnalyzer,
    kind: UploadKind,
    file: &UploadedFile,
    meal_date: Date,
    language: Language,
) -> Result<(String, MealAnalysis), ApiError> {
    let key = dated_key(kind.key_prefix(), meal_date, Uuid::new_v4(), &file.file_name);
    storage
        .put_object(&key, file.bytes.clone(), &file.content_type)
        .await?;
    info!(key = %key, size = file.bytes.len(), "upload stored");

    let analysis = match kind {
        UploadKind::Image => {
            analyzer
                .analyze_image(&file.bytes, &file.content_type, language)
                .await
        }
        UploadKind::Audio => {
            analyzer
                .analyze_voice(&file.bytes, &file.file_name, language)
                .await
        }
    };

    match analysis {
        Ok(a) => Ok((storage.object_url(&key), a)),
        Err(e) => {
            error!(error = %e, key = %key, "meal analysis failed");
            if let Err(del) = storage.delete_object(&key).await {
                error!(error = %del, key = %key, "could not remove upload after failed analysis");
            }
            Err(ApiError::Upstream("Analysis failed".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use time::macros::date;

    #[derive(Default)]
    struct RecordingStorage {
        puts: Mutex<Vec<String>>,
        deletes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StorageClient for RecordingStorage {
        async fn put_object(&self, key: &str, _body: Bytes, _ct: &str) -> anyhow::Result<()> {
            self.puts.lock().unwrap().push(key.to_string());
            Ok(())
        }
        async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
            self.deletes.lock().unwrap().push(key.to_string());
            Ok(())
        }
        fn object_url(&self, key: &str) -> String {
            format!("https://cdn.test/{key}")
        }
    }

    struct StubAnalyzer {
        fail: bool,
    }

    #[async_trait]
    impl MealAnalyzer for StubAnalyzer {
        async fn analyze_image(&self, _image: &[u8], _ct: &str, _lang: Language) -> anyhow::Result<MealAnalysis> {
            if self.fail {
                anyhow::bail!("model unavailable");
            }
            Ok(MealAnalysis {
                is_food: true,
                ..Default::default()
            })
        }
        async fn analyze_voice(&self, _audio: &[u8], _name: &str, language: Language) -> anyhow::Result<MealAnalysis> {
            if self.fail {
                anyhow::bail!("model unavailable");
            }
            Ok(MealAnalysis {
                transcription: Some(format!("{language:?}")),
                ..Default::default()
            })
        }
    }

    fn file(name: &str, ct: &str) -> UploadedFile {
        UploadedFile {
            file_name: name.into(),
            content_type: ct.into(),
            bytes: Bytes::from_static(b"\x89PNG"),
        }
    }

    #[test]
    fn language_resolution_order() {
        assert_eq!(resolve_language(Some("ru"), Some("en"), Language::Uz), Language::Ru);
        assert_eq!(resolve_language(Some("xx"), Some("en-US"), Language::Uz), Language::En);
        assert_eq!(resolve_language(None, None, Language::Uz), Language::Uz);
        assert_eq!(resolve_language(None, Some("de"), Language::En), Language::En);
    }

    #[test]
    fn upload_kinds_check_content_type() {
        assert!(UploadKind::Image.accepts("image/jpeg"));
        assert!(!UploadKind::Image.accepts("audio/mpeg"));
        assert!(UploadKind::Audio.accepts("audio/x-m4a"));
        assert!(UploadKind::Audio.accepts("video/webm"));
        assert!(!UploadKind::Image.accepts("video/webm"));
    }

    #[tokio::test]
    async fn successful_analysis_keeps_upload() {
        let storage = RecordingStorage::default();
        let (url, analysis) = store_and_analyze(
            &storage,
            &StubAnalyzer { fail: false },
            UploadKind::Image,
            &file("plov.png", "image/png"),
            date!(2024 - 03 - 07),
            Language::En,
        )
        .await
        .unwrap();
        assert!(analysis.is_food);
        let puts = storage.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert!(puts[0].starts_with("meals/2024/03/07/"));
        assert_eq!(url, format!("https://cdn.test/{}", puts[0]));
        assert!(storage.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_analysis_removes_upload() {
        let storage = RecordingStorage::default();
        let err = store_and_analyze(
            &storage,
            &StubAnalyzer { fail: true },
            UploadKind::Audio,
            &file("note.m4a", "audio/x-m4a"),
            date!(2024 - 03 - 07),
            Language::Uz,
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_GATEWAY);
        let puts = storage.puts.lock().unwrap().clone();
        assert!(puts[0].starts_with("meals/audio/2024/03/07/"));
        assert_eq!(*storage.deletes.lock().unwrap(), puts);
    }

    #[tokio::test]
    async fn voice_analysis_gets_language() {
        let storage = RecordingStorage::default();
        let (_, analysis) = store_and_analyze(
            &storage,
            &StubAnalyzer { fail: false },
            UploadKind::Audio,
            &file("note.ogg", "audio/ogg"),
            date!(2024 - 01 - 01),
            Language::Ru,
        )
        .await
        .unwrap();
        assert_eq!(analysis.transcription.as_deref(), Some("Ru"));
    }
}
