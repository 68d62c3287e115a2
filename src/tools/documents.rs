//! Document tools for the writing team
//!
//! All files live flat inside one sandbox directory; names containing path
//! separators or `..` are rejected.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{parse_arguments, Tool, ToolError, ToolSchema};

/// Sandboxed directory holding the documents
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, file_name: &str) -> Result<PathBuf, ToolError> {
        let invalid = file_name.is_empty()
            || file_name.contains("..")
            || file_name.contains('/')
            || file_name.contains('\\');
        if invalid {
            return Err(ToolError::InvalidArguments(format!(
                "invalid file name: {}",
                file_name
            )));
        }
        Ok(self.root.join(file_name))
    }

    pub async fn read(&self, file_name: &str) -> Result<String, ToolError> {
        let path = self.resolve(file_name)?;
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::ExecutionFailed(format!("document not found: {}", file_name))
            } else {
                ToolError::Io(e)
            }
        })
    }

    pub async fn write(&self, file_name: &str, content: &str) -> Result<(), ToolError> {
        let path = self.resolve(file_name)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, content).await?;
        Ok(())
    }
}

fn file_name_param() -> serde_json::Value {
    json!({"type": "string", "description": "File name inside the document workspace"})
}

/// Writes a numbered outline
pub struct CreateOutlineTool {
    store: DocumentStore,
}

impl CreateOutlineTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct OutlineArgs {
    points: Vec<String>,
    file_name: String,
}

#[async_trait]
impl Tool for CreateOutlineTool {
    fn name(&self) -> &str {
        "create_outline"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), "Create and save an outline.").with_parameters(json!({
            "type": "object",
            "properties": {
                "points": {"type": "array", "items": {"type": "string"}, "description": "Main points or sections"},
                "file_name": file_name_param()
            },
            "required": ["points", "file_name"]
        }))
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let args: OutlineArgs = parse_arguments(arguments)?;
        let outline: String = args
            .points
            .iter()
            .enumerate()
            .map(|(i, point)| format!("{}. {}\n", i + 1, point))
            .collect();

        self.store.write(&args.file_name, &outline).await?;
        Ok(format!("Outline saved to {}", args.file_name))
    }
}

/// Reads a document, optionally a line range
pub struct ReadDocumentTool {
    store: DocumentStore,
}

impl ReadDocumentTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct ReadArgs {
    file_name: String,
    start: Option<usize>,
    end: Option<usize>,
}

#[async_trait]
impl Tool for ReadDocumentTool {
    fn name(&self) -> &str {
        "read_document"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), "Read the specified document.").with_parameters(json!({
            "type": "object",
            "properties": {
                "file_name": file_name_param(),
                "start": {"type": "integer", "description": "First line to return (0-based)"},
                "end": {"type": "integer", "description": "Line to stop before"}
            },
            "required": ["file_name"]
        }))
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let args: ReadArgs = parse_arguments(arguments)?;
        let content = self.store.read(&args.file_name).await?;

        let lines: Vec<&str> = content.lines().collect();
        let start = args.start.unwrap_or(0).min(lines.len());
        let end = args.end.unwrap_or(lines.len()).clamp(start, lines.len());

        Ok(lines[start..end].join("\n"))
    }
}

/// Creates or replaces a document
pub struct WriteDocumentTool {
    store: DocumentStore,
}

impl WriteDocumentTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct WriteArgs {
    content: String,
    file_name: String,
}

#[async_trait]
impl Tool for WriteDocumentTool {
    fn name(&self) -> &str {
        "write_document"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), "Create and save a text document.").with_parameters(json!({
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "Text content to be written"},
                "file_name": file_name_param()
            },
            "required": ["content", "file_name"]
        }))
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let args: WriteArgs = parse_arguments(arguments)?;
        self.store.write(&args.file_name, &args.content).await?;
        Ok(format!("Document saved to {}", args.file_name))
    }
}

/// Inserts lines into an existing document
pub struct EditDocumentTool {
    store: DocumentStore,
}

impl EditDocumentTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct EditArgs {
    file_name: String,
    /// 1-based line number -> text inserted before that line
    inserts: BTreeMap<usize, String>,
}

#[async_trait]
impl Tool for EditDocumentTool {
    fn name(&self) -> &str {
        "edit_document"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            self.name(),
            "Edit a document by inserting text at specific line numbers.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "file_name": file_name_param(),
                "inserts": {
                    "type": "object",
                    "description": "Map of 1-based line numbers to text to insert",
                    "additionalProperties": {"type": "string"}
                }
            },
            "required": ["file_name", "inserts"]
        }))
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let args: EditArgs = parse_arguments(arguments)?;
        let content = self.store.read(&args.file_name).await?;
        let mut lines: Vec<String> = content.lines().map(String::from).collect();

        for line_number in args.inserts.keys() {
            if *line_number == 0 || *line_number > lines.len() + 1 {
                return Err(ToolError::InvalidArguments(format!(
                    "line number out of range: {}",
                    line_number
                )));
            }
        }

        // Inserting bottom-up keeps the requested line numbers valid
        for (line_number, text) in args.inserts.iter().rev() {
            lines.insert(line_number - 1, text.clone());
        }

        self.store.write(&args.file_name, &lines.join("\n")).await?;
        Ok(format!("Document edited and saved to {}", args.file_name))
    }
}
