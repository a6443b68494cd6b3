use image::ImageFormat;
use sqlx::PgConnection;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};

const NOTE_TYPES: [(&str, &str); 5] = [
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("ppt", "application/vnd.ms-powerpoint"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
];

const ZIP_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04];
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    pub stored_filename: String,
    pub original_filename: String,
    pub size: i64,
    pub extension: String,
    pub mime_type: &'static str,
}

impl StoredFile {
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// A row whose deletion cascades onto notes or answer images.
#[derive(Debug, Clone, Copy)]
pub enum FileScope {
    Course(Uuid),
    Unit(Uuid),
    Assessment(Uuid),
    User(Uuid),
}

impl FileScope {
    fn query(self) -> (&'static str, Uuid) {
        match self {
            FileScope::Course(id) => (
                r#"
                SELECT file_path FROM notes
                WHERE course_id = $1 OR unit_id IN (SELECT id FROM units WHERE course_id = $1)
                UNION
                SELECT a.image_path FROM answers a
                JOIN assessments s ON s.id = a.assessment_id
                WHERE a.image_path IS NOT NULL
                  AND (s.course_id = $1 OR s.unit_id IN (SELECT id FROM units WHERE course_id = $1))
                "#,
                id,
            ),
            FileScope::Unit(id) => (
                r#"
                SELECT file_path FROM notes WHERE unit_id = $1
                UNION
                SELECT a.image_path FROM answers a
                JOIN assessments s ON s.id = a.assessment_id
                WHERE a.image_path IS NOT NULL AND s.unit_id = $1
                "#,
                id,
            ),
            FileScope::Assessment(id) => (
                "SELECT image_path FROM answers WHERE assessment_id = $1 AND image_path IS NOT NULL",
                id,
            ),
            FileScope::User(id) => (
                r#"
                SELECT file_path FROM notes
                WHERE lecturer_id = $1
                   OR course_id IN (SELECT id FROM courses WHERE created_by = $1)
                UNION
                SELECT image_path FROM answers
                WHERE image_path IS NOT NULL
                  AND (student_id IN (SELECT id FROM students WHERE user_id = $1)
                       OR assessment_id IN (
                           SELECT s.id FROM assessments s
                           WHERE s.creator_id = $1
                              OR s.course_id IN (SELECT id FROM courses WHERE created_by = $1)))
                "#,
                id,
            ),
        }
    }
}

/// Answer images and lecture notes on the local upload volume.
#[derive(Clone, Debug)]
pub struct StorageService {
    root: PathBuf,
    max_bytes: usize,
    image_extensions: Vec<String>,
}

impl StorageService {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize, image_extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            max_bytes,
            image_extensions,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.upload_folder,
            config.max_upload_bytes,
            config.allowed_image_extensions.clone(),
        )
    }

    pub fn validate_image(&self, filename: &str, data: &[u8]) -> Result<(String, &'static str)> {
        let ext = extension_of(filename);
        if !self.image_extensions.iter().any(|e| e == &ext) {
            return Err(Error::File(format!(
                "Invalid image type. Allowed: {}",
                self.image_extensions.join(", ")
            )));
        }
        self.check_size(data)?;
        let mime = decode_image(data)
            .ok_or_else(|| Error::File("Uploaded file is not a valid image".into()))?;
        Ok((ext, mime))
    }

    pub fn validate_note(&self, filename: &str, data: &[u8]) -> Result<(String, &'static str)> {
        let ext = extension_of(filename);
        let mime = NOTE_TYPES
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, m)| *m)
            .ok_or_else(|| {
                Error::File(format!(
                    "File type .{} is not allowed. Allowed: pdf, doc, docx, ppt, pptx",
                    ext
                ))
            })?;
        if data.is_empty() {
            return Err(Error::File("Uploaded file is empty".into()));
        }
        self.check_size(data)?;
        let signature_ok = match ext.as_str() {
            "pdf" => data.starts_with(b"%PDF"),
            "docx" | "pptx" => data.starts_with(ZIP_MAGIC),
            "doc" | "ppt" => data.starts_with(OLE_MAGIC),
            _ => false,
        };
        if !signature_ok {
            return Err(Error::File(format!("Invalid .{} file content", ext)));
        }
        Ok((ext, mime))
    }

    pub async fn save_answer_image(&self, filename: &str, data: &[u8]) -> Result<StoredFile> {
        let (extension, mime_type) = self.validate_image(filename, data)?;
        let dir = self.root.join("student_answers");
        self.write(dir, filename, data, extension, mime_type).await
    }

    pub async fn save_note(
        &self,
        course_id: Uuid,
        unit_id: Uuid,
        filename: &str,
        data: &[u8],
    ) -> Result<StoredFile> {
        let (extension, mime_type) = self.validate_note(filename, data)?;
        let dir = self
            .root
            .join("notes")
            .join(format!("course_{}", course_id))
            .join(format!("unit_{}", unit_id));
        self.write(dir, filename, data, extension, mime_type).await
    }

    async fn write(
        &self,
        dir: PathBuf,
        original: &str,
        data: &[u8],
        extension: String,
        mime_type: &'static str,
    ) -> Result<StoredFile> {
        fs::create_dir_all(&dir).await.map_err(|e| {
            tracing::error!(dir = %dir.display(), error = %e, "Failed to create upload directory");
            Error::Internal(format!("Failed to prepare upload directory: {}", e))
        })?;

        let stored_filename = format!("{}_{}", Uuid::new_v4(), sanitize_filename(original));
        let path = dir.join(&stored_filename);
        if let Err(e) = fs::write(&path, data).await {
            tracing::error!(path = %path.display(), error = %e, "Failed to write upload");
            let _ = fs::remove_file(&path).await;
            return Err(Error::Internal(format!("Failed to save file: {}", e)));
        }

        Ok(StoredFile {
            path,
            stored_filename,
            original_filename: original.to_string(),
            size: data.len() as i64,
            extension,
            mime_type,
        })
    }

    /// Deletes a stored file. A file that is already gone counts as removed.
    pub async fn remove(&self, path: impl AsRef<Path>) -> Result<()> {
        match fs::remove_file(path.as_ref()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.as_ref().display(), "File already removed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(path = %path.as_ref().display(), error = %e, "Failed to delete file");
                Err(Error::Io(e))
            }
        }
    }

    /// Stored files that a delete of `scope` will orphan. Call it inside the
    /// deleting transaction, before the delete.
    pub async fn files_within(conn: &mut PgConnection, scope: FileScope) -> Result<Vec<String>> {
        let (sql, id) = scope.query();
        let paths = sqlx::query_scalar::<_, String>(sql)
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(paths)
    }

    /// Removes files whose rows are already gone. Failures are logged and
    /// otherwise ignored.
    pub async fn discard(&self, paths: &[String]) {
        for path in paths {
            if let Err(e) = self.remove(path).await {
                tracing::warn!(path = %path, error = %e, "Orphaned file left on disk");
            }
        }
    }

    fn check_size(&self, data: &[u8]) -> Result<()> {
        if data.len() > self.max_bytes {
            return Err(Error::File(format!(
                "File exceeds the maximum size of {} bytes",
                self.max_bytes
            )));
        }
        Ok(())
    }
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Content type for serving a stored image back.
pub fn image_mime_for(path: &str) -> &'static str {
    ImageFormat::from_path(path)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// Mime type of `data` when it fully decodes as a supported image.
fn decode_image(data: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(data).ok()?;
    let mime = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        _ => return None,
    };
    match image::load_from_memory_with_format(data, format) {
        Ok(_) => Some(mime),
        Err(e) => {
            tracing::warn!(error = %e, mime, "Uploaded image failed to decode");
            None
        }
    }
}

/// Keeps ASCII letters, digits, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Plain text of a reference document: `.txt` is read as UTF-8, `.pdf` goes
/// through `pdftotext`.
pub async fn extract_document_text(filename: &str, data: &[u8]) -> Result<String> {
    match extension_of(filename).as_str() {
        "txt" | "md" => Ok(String::from_utf8_lossy(data).into_owned()),
        "pdf" => {
            if !data.starts_with(b"%PDF") {
                return Err(Error::File("Invalid PDF file content".into()));
            }
            let tmp = std::env::temp_dir().join(format!("intellimark_{}.pdf", Uuid::new_v4()));
            fs::write(&tmp, data).await?;
            let output = tokio::process::Command::new("pdftotext")
                .arg("-layout")
                .arg(&tmp)
                .arg("-")
                .output()
                .await;
            let _ = fs::remove_file(&tmp).await;

            match output {
                Ok(out) if out.status.success() => {
                    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
                }
                Ok(out) => {
                    tracing::error!(
                        stderr = %String::from_utf8_lossy(&out.stderr),
                        "pdftotext failed"
                    );
                    Err(Error::File("Could not extract text from the PDF document".into()))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to run pdftotext");
                    Err(Error::Internal("PDF text extraction is unavailable".into()))
                }
            }
        }
        other => Err(Error::File(format!(
            "Unsupported reference document type .{}. Allowed: txt, pdf",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::new_rgb8(2, 2)
            .write_to(&mut out, format)
            .unwrap();
        out.into_inner()
    }

    fn storage(root: &Path) -> StorageService {
        StorageService::new(root, 4096, vec!["png".into(), "jpg".into(), "jpeg".into()])
    }

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("intellimark_test_{}", Uuid::new_v4()))
    }

    #[test]
    fn image_validation() {
        let s = storage(Path::new("/unused"));
        assert_eq!(s.validate_image("a.PNG", &encoded(ImageFormat::Png)).unwrap().1, "image/png");
        assert_eq!(s.validate_image("a.jpg", &encoded(ImageFormat::Jpeg)).unwrap().1, "image/jpeg");
        assert!(matches!(s.validate_image("a.gif", b"GIF89a"), Err(Error::File(_))));
        assert!(matches!(s.validate_image("a.png", b"not an image"), Err(Error::File(_))));
        assert!(matches!(s.validate_image("a.png", &[0x89; 100]), Err(Error::File(_))));
    }

    #[test]
    fn png_signature_with_junk_body_is_rejected() {
        let s = storage(Path::new("/unused"));
        let mut fake = PNG_SIGNATURE.to_vec();
        fake.extend_from_slice(b"this is definitely not a PNG stream");
        assert!(matches!(s.validate_image("fake.png", &fake), Err(Error::File(_))));

        let png = encoded(ImageFormat::Png);
        let truncated = &png[..png.len() / 2];
        assert!(matches!(s.validate_image("cut.png", truncated), Err(Error::File(_))));
    }

    #[test]
    fn served_images_get_their_content_type() {
        assert_eq!(image_mime_for("/up/student_answers/x_a.JPG"), "image/jpeg");
        assert_eq!(image_mime_for("/up/student_answers/x_a.png"), "image/png");
        assert_eq!(image_mime_for("/up/student_answers/x_a"), "application/octet-stream");
    }

    #[tokio::test]
    async fn discard_ignores_missing_files() {
        let root = temp_root();
        let s = storage(&root);
        let kept = s.save_answer_image("a.png", &encoded(ImageFormat::Png)).await.unwrap();
        let missing = root.join("student_answers").join("gone.png");

        s.discard(&[kept.path_string(), missing.to_string_lossy().into_owned()])
            .await;
        assert!(!kept.path.exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn oversized_images_are_rejected() {
        let s = StorageService::new("/unused", 16, vec!["png".into()]);
        assert!(matches!(
            s.validate_image("big.png", &encoded(ImageFormat::Png)),
            Err(Error::File(_))
        ));
    }

    #[test]
    fn note_validation() {
        let s = storage(Path::new("/unused"));
        assert_eq!(
            s.validate_note("week1.pdf", b"%PDF-1.7").unwrap().1,
            "application/pdf"
        );
        assert!(s.validate_note("slides.pptx", &[0x50, 0x4B, 0x03, 0x04, 1]).is_ok());
        assert!(s.validate_note("notes.exe", b"MZ").is_err());
        assert!(s.validate_note("fake.pdf", b"hello").is_err());
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("My Notes (v2).pdf"), "My_Notes__v2_.pdf");
        assert_eq!(sanitize_filename(".."), "file");
    }

    #[tokio::test]
    async fn notes_are_stored_per_course_and_unit() {
        let root = temp_root();
        let s = storage(&root);
        let (course, unit) = (Uuid::new_v4(), Uuid::new_v4());
        let stored = s.save_note(course, unit, "intro.pdf", b"%PDF-1.4").await.unwrap();

        let expected_dir = root
            .join("notes")
            .join(format!("course_{}", course))
            .join(format!("unit_{}", unit));
        assert_eq!(stored.path.parent().unwrap(), expected_dir);
        assert!(stored.stored_filename.ends_with("_intro.pdf"));
        assert_eq!(stored.size, 8);

        s.remove(&stored.path).await.unwrap();
        assert!(!stored.path.exists());
        s.remove(&stored.path).await.unwrap();
        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn invalid_image_leaves_nothing_behind() {
        let root = temp_root();
        let s = storage(&root);
        assert!(s.save_answer_image("x.png", b"garbage").await.is_err());
        assert!(!root.join("student_answers").exists());
    }

    #[tokio::test]
    async fn text_documents_are_read_directly() {
        let text = extract_document_text("ref.txt", "Binary trees".as_bytes())
            .await
            .unwrap();
        assert_eq!(text, "Binary trees");
        assert!(extract_document_text("ref.docx", b"PK").await.is_err());
    }
}
