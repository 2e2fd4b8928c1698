//! The CAD host capability boundary.
//!
//! Everything the bridge can ask the CAD application to do is expressed
//! through the [`CadHost`] trait. The trait is synchronous and expects
//! exclusive access for mutations: the real scripting surfaces behind it are
//! single-threaded and provide no locking of their own. The bridge server is
//! responsible for never driving a host with overlapping mutating calls.
//!
//! A real deployment implements [`CadHost`] against the application's
//! scripting runtime; [`SimulatedHost`] is the in-memory implementation used
//! by the `cad-bridge-sim` binary and by tests.

mod simulated;

pub use simulated::SimulatedHost;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Maximum number of entities returned by an object listing.
///
/// Large documents can hold thousands of bodies; listings are capped so a
/// single read cannot produce an unbounded response.
pub const MAX_LISTED_OBJECTS: usize = 10;

/// Smallest accepted capture dimension, in pixels.
pub const MIN_CAPTURE_DIMENSION: u32 = 100;

/// Largest accepted capture dimension, in pixels.
pub const MAX_CAPTURE_DIMENSION: u32 = 4096;

/// Image formats a capture request may ask for.
pub const CAPTURE_FORMATS: &[&str] = &["png", "jpg", "jpeg"];

/// Errors raised by a CAD host while servicing a bridge operation.
///
/// These are application-level outcomes: the bridge reports them in a
/// `success:false` envelope rather than as transport failures.
#[derive(Error, Debug)]
pub enum HostError {
    /// No document is open in the host.
    #[error("no active document")]
    NoActiveDocument,

    /// The active product is not a design workspace.
    #[error("the active product is not a design workspace")]
    NotDesignWorkspace,

    /// No viewport is available to render.
    #[error("no active viewport")]
    NoActiveViewport,

    /// The host cannot build the requested object type.
    #[error("unsupported object type: {object_type} (supported: {supported})")]
    UnsupportedObjectType {
        /// The requested type.
        object_type: String,
        /// Human-readable list of supported type/profile combinations.
        supported: String,
    },

    /// The entity identifier does not name a live entity.
    #[error("unknown object: {id}")]
    UnknownEntity {
        /// The identifier that failed to resolve.
        id: String,
    },

    /// The requested part does not exist in the library.
    #[error("unknown part: {library}/{part}")]
    UnknownPart {
        /// Library name.
        library: String,
        /// Part name.
        part: String,
    },

    /// A capture request failed parameter validation.
    #[error("invalid capture request: {message}")]
    InvalidCapture {
        /// Description of the invalid parameter.
        message: String,
    },

    /// Rendering the viewport to an image failed.
    #[error("view rendering failed: {message}")]
    Render {
        /// Description of the failure.
        message: String,
    },

    /// Script execution failed or is unavailable.
    #[error("script execution failed: {message}")]
    Script {
        /// Description of the failure.
        message: String,
    },
}

/// Snapshot of the host application's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStatus {
    /// Product name reported by the host.
    pub app_name: String,
    /// Product version reported by the host.
    pub version: String,
    /// Name of the active document, if any.
    pub active_document: Option<String>,
    /// Whether the active product is a design workspace.
    pub design_workspace: bool,
}

/// Parameters for creating a new document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    /// Document name.
    pub name: String,
    /// Optional template the document is created from.
    #[serde(default)]
    pub template: Option<String>,
    /// Unit system for the document (e.g. `"mm"`).
    pub units: String,
}

/// Result of a document creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Identifier of the created document.
    pub document_id: String,
    /// Display name of the created document.
    pub document_name: String,
}

/// Parameters for creating a new object in the active document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewObject {
    /// Feature type (e.g. `"extrude"`, `"revolve"`).
    #[serde(rename = "type")]
    pub object_type: String,
    /// Feature parameters, including the base profile.
    pub parameters: Map<String, Value>,
    /// Placement position, `[x, y, z]`.
    pub position: [f64; 3],
    /// Placement rotation, `[rx, ry, rz]` in degrees.
    pub rotation: [f64; 3],
}

/// Result of an object creation or edit.
///
/// `object_id` is an opaque token minted by the host; it is stable for the
/// entity's lifetime within one document session and carries no other
/// guarantees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedObject {
    /// Token naming the created entity.
    pub object_id: String,
    /// Feature type of the entity.
    #[serde(rename = "type")]
    pub object_type: String,
    /// Parameters the entity was built with.
    pub parameters: Map<String, Value>,
}

/// Summary of one entity, as returned by listings and single-object reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityInfo {
    /// Opaque entity token.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Entity kind (e.g. `"body"`, `"occurrence"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Whether the entity is visible in the viewport.
    pub visible: bool,
}

/// Viewport dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Camera description for the active viewport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraInfo {
    /// Camera eye position.
    pub eye: [f64; 3],
    /// Camera target position.
    pub target: [f64; 3],
    /// Camera up vector.
    #[serde(rename = "upVector")]
    pub up_vector: [f64; 3],
    /// View extents.
    #[serde(rename = "viewExtents")]
    pub view_extents: f64,
    /// `"Perspective"` or `"Orthographic"`.
    #[serde(rename = "cameraType")]
    pub camera_type: String,
}

/// Description of the active viewport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewInfo {
    /// Viewport dimensions.
    pub viewport: ViewportSize,
    /// Camera state.
    pub camera: CameraInfo,
}

/// Parameters for capturing the active viewport to an image file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRequest {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Image format (`"png"`, `"jpg"` or `"jpeg"`).
    pub format: String,
    /// Output filename; a timestamped name is generated when omitted.
    #[serde(default)]
    pub filename: Option<String>,
    /// Whether to inline the image bytes as base64 in the response.
    #[serde(default)]
    pub return_base64: bool,
}

impl CaptureRequest {
    /// Validates dimensions and format.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InvalidCapture`] when a dimension is outside
    /// [`MIN_CAPTURE_DIMENSION`]..=[`MAX_CAPTURE_DIMENSION`] or the format is
    /// not one of [`CAPTURE_FORMATS`].
    pub fn validate(&self) -> Result<(), HostError> {
        let dimension_ok =
            |v: u32| (MIN_CAPTURE_DIMENSION..=MAX_CAPTURE_DIMENSION).contains(&v);
        if !dimension_ok(self.width) {
            return Err(HostError::InvalidCapture {
                message: format!(
                    "width must be between {MIN_CAPTURE_DIMENSION} and {MAX_CAPTURE_DIMENSION} pixels"
                ),
            });
        }
        if !dimension_ok(self.height) {
            return Err(HostError::InvalidCapture {
                message: format!(
                    "height must be between {MIN_CAPTURE_DIMENSION} and {MAX_CAPTURE_DIMENSION} pixels"
                ),
            });
        }
        if !CAPTURE_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(HostError::InvalidCapture {
                message: format!("supported formats: {}", CAPTURE_FORMATS.join(", ")),
            });
        }
        Ok(())
    }
}

/// Result of a viewport capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResult {
    /// Absolute path of the written image file.
    pub file_path: PathBuf,
    /// Filename component of `file_path`.
    pub filename: String,
    /// Size of the written file in bytes.
    pub file_size: u64,
    /// Image dimensions.
    pub dimensions: ViewportSize,
    /// Image format actually written.
    pub format: String,
    /// Base64-encoded image bytes, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

/// One entry in the host's part library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    /// Library the part belongs to.
    pub library: String,
    /// Part name.
    pub part: String,
    /// Human-readable description.
    pub description: String,
}

/// Parameters for inserting a library part into the active document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartPlacement {
    /// Library name.
    pub library: String,
    /// Part name.
    pub part: String,
    /// Placement position, `[x, y, z]`.
    pub position: [f64; 3],
}

/// Result of a part insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertedPart {
    /// Token naming the inserted occurrence.
    pub object_id: String,
    /// Library the part came from.
    pub library: String,
    /// Part name.
    pub part: String,
}

/// The capability surface a CAD application exposes to the bridge.
///
/// Methods taking `&mut self` mutate document state and must never run
/// concurrently; the bridge's single-flight guard enforces that. Read
/// methods take `&self` and are expected to be safe against the host's own
/// read paths.
pub trait CadHost: Send + 'static {
    /// Reports the host application's current state.
    fn status(&self) -> HostStatus;

    /// Creates a new document and makes it active.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejects the document parameters.
    fn create_document(&mut self, request: &NewDocument) -> Result<DocumentInfo, HostError>;

    /// Creates a new object in the active document.
    ///
    /// # Errors
    ///
    /// Returns an error if no document is active or the object type is not
    /// supported.
    fn create_object(&mut self, request: &NewObject) -> Result<CreatedObject, HostError>;

    /// Replaces parameters on an existing entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier does not resolve.
    fn edit_object(
        &mut self,
        id: &str,
        parameters: &Map<String, Value>,
    ) -> Result<CreatedObject, HostError>;

    /// Deletes an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier does not resolve.
    fn delete_object(&mut self, id: &str) -> Result<(), HostError>;

    /// Fetches one entity by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier does not resolve.
    fn get_object(&self, id: &str) -> Result<EntityInfo, HostError>;

    /// Lists entities in the active document, capped at
    /// [`MAX_LISTED_OBJECTS`].
    ///
    /// # Errors
    ///
    /// Returns an error if no document is active.
    fn list_objects(&self) -> Result<Vec<EntityInfo>, HostError>;

    /// Describes the active viewport and camera.
    ///
    /// # Errors
    ///
    /// Returns an error if no viewport is available.
    fn view_info(&self) -> Result<ViewInfo, HostError>;

    /// Renders the active viewport to an image file.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid parameters or render failure.
    fn capture_view(&mut self, request: &CaptureRequest) -> Result<CaptureResult, HostError>;

    /// Lists the parts available in the host's part library.
    ///
    /// # Errors
    ///
    /// Returns an error if the library is unavailable.
    fn list_parts(&self) -> Result<Vec<PartInfo>, HostError>;

    /// Inserts a library part into the active document.
    ///
    /// # Errors
    ///
    /// Returns an error if the part does not exist or no document is active.
    fn insert_part(&mut self, placement: &PartPlacement) -> Result<InsertedPart, HostError>;

    /// Runs a script inside the host's scripting context.
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails or is unavailable.
    fn execute_script(
        &mut self,
        code: &str,
        context: &Map<String, Value>,
    ) -> Result<Value, HostError>;
}
