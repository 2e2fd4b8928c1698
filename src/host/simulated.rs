//! In-memory CAD host for development and testing.
//!
//! `SimulatedHost` mimics the observable behaviour of a real host's scripting
//! surface: one active document, opaque entity tokens, a capped object
//! listing, capture-parameter validation, and a small built-in part library.
//! Rendered captures are placeholder images — the point is exercising the
//! bridge, not producing pixels.

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{
    CadHost, CameraInfo, CaptureRequest, CaptureResult, CreatedObject, DocumentInfo, EntityInfo,
    HostError, HostStatus, InsertedPart, NewDocument, NewObject, PartInfo, PartPlacement,
    ViewInfo, ViewportSize, MAX_LISTED_OBJECTS,
};

/// A minimal valid 1×1 PNG, written as the body of every simulated capture.
const PLACEHOLDER_IMAGE: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x62, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Feature/profile combinations the simulated host can build.
const SUPPORTED_FEATURES: &[(&str, &[&str])] = &[
    ("extrude", &["circle", "rectangle"]),
    ("revolve", &["semicircle"]),
];

struct SimEntity {
    token: String,
    name: String,
    kind: String,
    visible: bool,
    object_type: String,
    parameters: Map<String, Value>,
}

struct ActiveDocument {
    name: String,
    entities: Vec<SimEntity>,
    body_counter: usize,
}

/// In-memory stand-in for a real CAD host.
pub struct SimulatedHost {
    active: Option<ActiveDocument>,
    capture_dir: PathBuf,
    parts: Vec<PartInfo>,
}

impl SimulatedHost {
    /// Creates a simulated host with no open document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: None,
            capture_dir: std::env::temp_dir(),
            parts: builtin_parts(),
        }
    }

    /// Overrides the directory captures are written to.
    #[must_use]
    pub fn with_capture_dir(mut self, dir: PathBuf) -> Self {
        self.capture_dir = dir;
        self
    }

    fn active_document(&self) -> Result<&ActiveDocument, HostError> {
        self.active.as_ref().ok_or(HostError::NoActiveDocument)
    }

    fn active_document_mut(&mut self) -> Result<&mut ActiveDocument, HostError> {
        self.active.as_mut().ok_or(HostError::NoActiveDocument)
    }

    fn supported_summary() -> String {
        SUPPORTED_FEATURES
            .iter()
            .map(|(feature, profiles)| format!("{feature} ({})", profiles.join(", ")))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn feature_supported(object_type: &str, base_feature: Option<&str>) -> bool {
        SUPPORTED_FEATURES.iter().any(|(feature, profiles)| {
            *feature == object_type
                && base_feature.is_some_and(|profile| profiles.contains(&profile))
        })
    }
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl CadHost for SimulatedHost {
    fn status(&self) -> HostStatus {
        HostStatus {
            app_name: "Simulated CAD Host".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            active_document: self.active.as_ref().map(|doc| doc.name.clone()),
            design_workspace: self.active.is_some(),
        }
    }

    fn create_document(&mut self, request: &NewDocument) -> Result<DocumentInfo, HostError> {
        let name = request.name.clone();
        self.active = Some(ActiveDocument {
            name: name.clone(),
            entities: Vec::new(),
            body_counter: 0,
        });
        Ok(DocumentInfo {
            document_id: name.clone(),
            document_name: name,
        })
    }

    fn create_object(&mut self, request: &NewObject) -> Result<CreatedObject, HostError> {
        let base_feature = request
            .parameters
            .get("base_feature")
            .and_then(Value::as_str)
            .map(str::to_string);
        if !Self::feature_supported(&request.object_type, base_feature.as_deref()) {
            return Err(HostError::UnsupportedObjectType {
                object_type: request.object_type.clone(),
                supported: Self::supported_summary(),
            });
        }

        let object_type = request.object_type.clone();
        let parameters = request.parameters.clone();
        let doc = self.active_document_mut()?;
        doc.body_counter += 1;
        let token = Uuid::new_v4().to_string();
        doc.entities.push(SimEntity {
            token: token.clone(),
            name: format!("Body{}", doc.body_counter),
            kind: "body".to_string(),
            visible: true,
            object_type: object_type.clone(),
            parameters: parameters.clone(),
        });

        Ok(CreatedObject {
            object_id: token,
            object_type,
            parameters,
        })
    }

    fn edit_object(
        &mut self,
        id: &str,
        parameters: &Map<String, Value>,
    ) -> Result<CreatedObject, HostError> {
        let doc = self.active_document_mut()?;
        let entity = doc
            .entities
            .iter_mut()
            .find(|entity| entity.token == id)
            .ok_or_else(|| HostError::UnknownEntity { id: id.to_string() })?;

        for (key, value) in parameters {
            entity.parameters.insert(key.clone(), value.clone());
        }

        Ok(CreatedObject {
            object_id: entity.token.clone(),
            object_type: entity.object_type.clone(),
            parameters: entity.parameters.clone(),
        })
    }

    fn delete_object(&mut self, id: &str) -> Result<(), HostError> {
        let doc = self.active_document_mut()?;
        let index = doc
            .entities
            .iter()
            .position(|entity| entity.token == id)
            .ok_or_else(|| HostError::UnknownEntity { id: id.to_string() })?;
        doc.entities.remove(index);
        Ok(())
    }

    fn get_object(&self, id: &str) -> Result<EntityInfo, HostError> {
        let doc = self.active_document()?;
        doc.entities
            .iter()
            .find(|entity| entity.token == id)
            .map(|entity| EntityInfo {
                id: entity.token.clone(),
                name: entity.name.clone(),
                kind: entity.kind.clone(),
                visible: entity.visible,
            })
            .ok_or_else(|| HostError::UnknownEntity { id: id.to_string() })
    }

    fn list_objects(&self) -> Result<Vec<EntityInfo>, HostError> {
        let doc = self.active_document()?;
        Ok(doc
            .entities
            .iter()
            .take(MAX_LISTED_OBJECTS)
            .map(|entity| EntityInfo {
                id: entity.token.clone(),
                name: entity.name.clone(),
                kind: entity.kind.clone(),
                visible: entity.visible,
            })
            .collect())
    }

    fn view_info(&self) -> Result<ViewInfo, HostError> {
        if self.active.is_none() {
            return Err(HostError::NoActiveViewport);
        }
        Ok(ViewInfo {
            viewport: ViewportSize {
                width: 1280,
                height: 720,
            },
            camera: CameraInfo {
                eye: [20.0, -20.0, 15.0],
                target: [0.0, 0.0, 0.0],
                up_vector: [0.0, 0.0, 1.0],
                view_extents: 30.0,
                camera_type: "Orthographic".to_string(),
            },
        })
    }

    fn capture_view(&mut self, request: &CaptureRequest) -> Result<CaptureResult, HostError> {
        if self.active.is_none() {
            return Err(HostError::NoActiveViewport);
        }
        request.validate()?;

        let format = request.format.to_lowercase();
        let filename = request.filename.clone().map_or_else(
            || {
                let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
                format!("view_{timestamp}.{format}")
            },
            |name| {
                if std::path::Path::new(&name)
                    .extension()
                    .is_some_and(|ext| {
                        super::CAPTURE_FORMATS
                            .contains(&ext.to_string_lossy().to_lowercase().as_str())
                    })
                {
                    name
                } else {
                    format!("{name}.{format}")
                }
            },
        );

        let file_path = self.capture_dir.join(&filename);
        std::fs::write(&file_path, PLACEHOLDER_IMAGE).map_err(|e| HostError::Render {
            message: format!("failed to write {}: {e}", file_path.display()),
        })?;

        let file_size = PLACEHOLDER_IMAGE.len() as u64;
        let image_data = request
            .return_base64
            .then(|| BASE64_STANDARD.encode(PLACEHOLDER_IMAGE));

        Ok(CaptureResult {
            file_path,
            filename,
            file_size,
            dimensions: ViewportSize {
                width: request.width,
                height: request.height,
            },
            format,
            image_data,
        })
    }

    fn list_parts(&self) -> Result<Vec<PartInfo>, HostError> {
        Ok(self.parts.clone())
    }

    fn insert_part(&mut self, placement: &PartPlacement) -> Result<InsertedPart, HostError> {
        if !self
            .parts
            .iter()
            .any(|p| p.library == placement.library && p.part == placement.part)
        {
            return Err(HostError::UnknownPart {
                library: placement.library.clone(),
                part: placement.part.clone(),
            });
        }

        let part = placement.part.clone();
        let library = placement.library.clone();
        let doc = self.active_document_mut()?;
        let token = Uuid::new_v4().to_string();
        doc.entities.push(SimEntity {
            token: token.clone(),
            name: part.clone(),
            kind: "occurrence".to_string(),
            visible: true,
            object_type: "occurrence".to_string(),
            parameters: Map::new(),
        });

        Ok(InsertedPart {
            object_id: token,
            library,
            part,
        })
    }

    fn execute_script(
        &mut self,
        _code: &str,
        _context: &Map<String, Value>,
    ) -> Result<Value, HostError> {
        Err(HostError::Script {
            message: "script execution is not available in the simulated host".to_string(),
        })
    }
}

fn builtin_parts() -> Vec<PartInfo> {
    vec![
        PartInfo {
            library: "fasteners".to_string(),
            part: "M3x8 socket head screw".to_string(),
            description: "ISO 4762 M3x8 socket head cap screw".to_string(),
        },
        PartInfo {
            library: "fasteners".to_string(),
            part: "M3 hex nut".to_string(),
            description: "ISO 4032 M3 hex nut".to_string(),
        },
        PartInfo {
            library: "bearings".to_string(),
            part: "608ZZ ball bearing".to_string(),
            description: "8x22x7 mm shielded deep-groove ball bearing".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_document(name: &str) -> NewDocument {
        NewDocument {
            name: name.to_string(),
            template: None,
            units: "mm".to_string(),
        }
    }

    fn cylinder() -> NewObject {
        let mut parameters = Map::new();
        parameters.insert("base_feature".to_string(), json!("circle"));
        parameters.insert("radius".to_string(), json!(25.0));
        parameters.insert("height".to_string(), json!(50.0));
        NewObject {
            object_type: "extrude".to_string(),
            parameters,
            position: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn status_reflects_active_document() {
        let mut host = SimulatedHost::new();
        assert_eq!(host.status().active_document, None);
        assert!(!host.status().design_workspace);

        host.create_document(&new_document("Bracket")).unwrap();
        let status = host.status();
        assert_eq!(status.active_document.as_deref(), Some("Bracket"));
        assert!(status.design_workspace);
    }

    #[test]
    fn create_object_requires_a_document() {
        let mut host = SimulatedHost::new();
        let err = host.create_object(&cylinder()).unwrap_err();
        assert!(matches!(err, HostError::NoActiveDocument));
    }

    #[test]
    fn create_object_mints_distinct_tokens() {
        let mut host = SimulatedHost::new();
        host.create_document(&new_document("Doc")).unwrap();
        let a = host.create_object(&cylinder()).unwrap();
        let b = host.create_object(&cylinder()).unwrap();
        assert_ne!(a.object_id, b.object_id);
        assert_eq!(a.object_type, "extrude");
        assert_eq!(a.parameters.get("radius"), Some(&json!(25.0)));
    }

    #[test]
    fn unsupported_feature_lists_supported_combinations() {
        let mut host = SimulatedHost::new();
        host.create_document(&new_document("Doc")).unwrap();
        let mut request = cylinder();
        request.object_type = "loft".to_string();
        let err = host.create_object(&request).unwrap_err();
        assert!(err.to_string().contains("revolve (semicircle)"));
    }

    #[test]
    fn listing_is_capped() {
        let mut host = SimulatedHost::new();
        host.create_document(&new_document("Doc")).unwrap();
        for _ in 0..15 {
            host.create_object(&cylinder()).unwrap();
        }
        let objects = host.list_objects().unwrap();
        assert_eq!(objects.len(), MAX_LISTED_OBJECTS);
    }

    #[test]
    fn delete_then_get_fails() {
        let mut host = SimulatedHost::new();
        host.create_document(&new_document("Doc")).unwrap();
        let created = host.create_object(&cylinder()).unwrap();

        assert!(host.get_object(&created.object_id).is_ok());
        host.delete_object(&created.object_id).unwrap();
        let err = host.get_object(&created.object_id).unwrap_err();
        assert!(matches!(err, HostError::UnknownEntity { .. }));
    }

    #[test]
    fn edit_merges_parameters() {
        let mut host = SimulatedHost::new();
        host.create_document(&new_document("Doc")).unwrap();
        let created = host.create_object(&cylinder()).unwrap();

        let mut edits = Map::new();
        edits.insert("height".to_string(), json!(80.0));
        let updated = host.edit_object(&created.object_id, &edits).unwrap();
        assert_eq!(updated.parameters.get("height"), Some(&json!(80.0)));
        assert_eq!(updated.parameters.get("radius"), Some(&json!(25.0)));
    }

    #[test]
    fn capture_writes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = SimulatedHost::new().with_capture_dir(dir.path().to_path_buf());
        host.create_document(&new_document("Doc")).unwrap();

        let result = host
            .capture_view(&CaptureRequest {
                width: 800,
                height: 600,
                format: "png".to_string(),
                filename: Some("shot".to_string()),
                return_base64: true,
            })
            .unwrap();

        assert_eq!(result.filename, "shot.png");
        assert!(result.file_path.exists());
        assert_eq!(result.file_size, PLACEHOLDER_IMAGE.len() as u64);
        let decoded = BASE64_STANDARD
            .decode(result.image_data.unwrap())
            .unwrap();
        assert_eq!(decoded, PLACEHOLDER_IMAGE);
    }

    #[test]
    fn capture_without_viewport_fails() {
        let mut host = SimulatedHost::new();
        let err = host
            .capture_view(&CaptureRequest {
                width: 800,
                height: 600,
                format: "png".to_string(),
                filename: None,
                return_base64: false,
            })
            .unwrap_err();
        assert!(matches!(err, HostError::NoActiveViewport));
    }

    #[test]
    fn insert_unknown_part_fails() {
        let mut host = SimulatedHost::new();
        host.create_document(&new_document("Doc")).unwrap();
        let err = host
            .insert_part(&PartPlacement {
                library: "fasteners".to_string(),
                part: "M99 mystery bolt".to_string(),
                position: [0.0, 0.0, 0.0],
            })
            .unwrap_err();
        assert!(matches!(err, HostError::UnknownPart { .. }));
    }

    #[test]
    fn insert_known_part_adds_an_occurrence() {
        let mut host = SimulatedHost::new();
        host.create_document(&new_document("Doc")).unwrap();
        let inserted = host
            .insert_part(&PartPlacement {
                library: "bearings".to_string(),
                part: "608ZZ ball bearing".to_string(),
                position: [10.0, 0.0, 0.0],
            })
            .unwrap();

        let fetched = host.get_object(&inserted.object_id).unwrap();
        assert_eq!(fetched.kind, "occurrence");
    }

    #[test]
    fn script_execution_is_rejected() {
        let mut host = SimulatedHost::new();
        let err = host
            .execute_script("print('hi')", &Map::new())
            .unwrap_err();
        assert!(matches!(err, HostError::Script { .. }));
    }
}
