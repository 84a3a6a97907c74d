use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use ulid::Ulid;

use crate::config::Settings;
use crate::documents::{
    select_upload, Answer, IndexBuilder, IndexError, IndexedDocument, IntakeError, LanguageModel,
    QueryEngine, QueryError, QueryOptions, StagedDocument, UploadedFile,
};
use crate::gradient::{GradientClient, GradientEmbedding, GradientError, GradientLlm};

/// Shown instead of an answer while no document is indexed
pub const UPLOAD_PROMPT: &str = "Upload your PDF to chat";

pub const USER_MARKER: &str = "👨🏻";
pub const ASSISTANT_MARKER: &str = "🤖";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0}")]
    Intake(#[from] IntakeError),
    #[error("Indexing failed: {0}")]
    Build(#[from] IndexError),
    #[error("{0}")]
    Query(#[from] QueryError),
}

impl Serialize for SessionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn marker(self) -> &'static str {
        match self {
            MessageRole::User => USER_MARKER,
            MessageRole::Assistant => ASSISTANT_MARKER,
        }
    }
}

/// One transcript entry. Never modified after it is appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: MessageRole,
    pub marker: String,
    pub content: String,
    pub created: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            marker: role.marker().to_string(),
            content: content.into(),
            created: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Append-only chat history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Everything a build action needs: how to index, which model answers, and
/// where uploads are staged.
#[derive(Clone)]
pub struct Pipeline {
    pub builder: IndexBuilder,
    pub llm: Arc<dyn LanguageModel>,
    pub options: QueryOptions,
    pub staging_dir: PathBuf,
}

impl Pipeline {
    pub fn new(builder: IndexBuilder, llm: Arc<dyn LanguageModel>, options: QueryOptions, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            builder,
            llm,
            options,
            staging_dir: staging_dir.into(),
        }
    }

    /// Gradient-backed pipeline configured from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, GradientError> {
        let client = Arc::new(GradientClient::from_settings(settings)?);
        let embedder = Arc::new(GradientEmbedding::new(Arc::clone(&client), settings.embedding_model.clone()));
        let llm = Arc::new(GradientLlm::new(client, settings.llm_model.clone()));

        let builder = IndexBuilder::new(embedder)
            .with_splitter(settings.splitter())
            .with_batch_size(settings.embed_batch_size)
            .with_timeout(settings.request_timeout);

        Ok(Self::new(builder, llm, settings.query_options(), settings.staging_dir()))
    }
}

/// Result of one user turn
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// Nothing is indexed yet; nothing was asked
    UploadPrompt,
    Answered(Answer),
}

/// State of one interactive session
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub created: DateTime<Utc>,
    transcript: Transcript,
    activated: bool,
    selected: Option<UploadedFile>,
    engine: Option<QueryEngine>,
    document: Option<IndexedDocument>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            created: Utc::now(),
            transcript: Transcript::new(),
            activated: false,
            selected: None,
            engine: None,
            document: None,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// True once a build action has succeeded
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn document(&self) -> Option<&IndexedDocument> {
        self.document.as_ref()
    }

    pub fn selected(&self) -> Option<&UploadedFile> {
        self.selected.as_ref()
    }

    /// Validate and remember the file to index next. A rejected selection
    /// leaves the previous one in place.
    pub fn select_file(&mut self, paths: &[PathBuf]) -> Result<&UploadedFile, SessionError> {
        let upload = select_upload(paths)?;
        info!(file = %upload.name(), bytes = upload.len(), "Selected upload");
        Ok(self.selected.insert(upload))
    }

    pub fn select_path(&mut self, path: &Path) -> Result<&UploadedFile, SessionError> {
        self.select_file(&[path.to_path_buf()])
    }

    /// Index the selected file.
    pub async fn process_selected(&mut self, pipeline: &Pipeline) -> Result<IndexedDocument, SessionError> {
        let upload = self.selected.clone().ok_or(IntakeError::NoFile)?;
        self.process_upload(pipeline, &upload).await
    }

    /// Stage `upload`, build its index and install a fresh query engine.
    ///
    /// On failure the session keeps its previous engine and document.
    pub async fn process_upload(&mut self, pipeline: &Pipeline, upload: &UploadedFile) -> Result<IndexedDocument, SessionError> {
        let staged = StagedDocument::stage(upload, &pipeline.staging_dir)?;

        let index = match pipeline.builder.build_index(staged.path(), staged.original_name()).await {
            Ok(index) => index,
            Err(e) => {
                warn!(file = %upload.name(), error = %e, "Index build failed");
                return Err(e.into());
            }
        };
        drop(staged);

        let engine = QueryEngine::new(
            index,
            pipeline.builder.embedder(),
            Arc::clone(&pipeline.llm),
            pipeline.options,
        );
        let document = engine.document().clone();

        if let Some(previous) = &self.document {
            info!(previous = %previous.filename, "Replacing query engine");
        }
        self.engine = Some(engine);
        self.document = Some(document.clone());
        self.activated = true;

        info!(file = %document.filename, chunks = document.chunk_count, "Document ready");
        Ok(document)
    }

    /// Answer one question.
    ///
    /// Without an indexed document this returns `UploadPrompt` and leaves the
    /// transcript alone. A failed answer appends nothing.
    pub async fn ask(&mut self, question: &str) -> Result<TurnOutcome, SessionError> {
        let Some(engine) = self.engine.as_ref() else {
            return Ok(TurnOutcome::UploadPrompt);
        };

        let answer = engine.answer(question).await?;

        self.transcript.append(Message::user(question.trim()));
        self.transcript.append(Message::assistant(answer.text.clone()));
        Ok(TurnOutcome::Answered(answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{
        DocumentLoader, EmbeddingModel, GenerationError, HashingEmbedder, LoadedDocument, LoaderError,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MINIMAL_PDF: &[u8] = b"%PDF-1.4\n%%EOF\n";

    struct FixedText(&'static str);

    impl DocumentLoader for FixedText {
        fn load(&self, _path: &Path, display_name: &str) -> Result<LoadedDocument, LoaderError> {
            if self.0.is_empty() {
                return Err(LoaderError::NoText(display_name.to_string()));
            }
            Ok(LoadedDocument::new(display_name, self.0))
        }
    }

    #[derive(Default)]
    struct CountingLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for CountingLlm {
        fn name(&self) -> &str {
            "counting"
        }

        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String, GenerationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("answer {}", n))
        }
    }

    fn pipeline(text: &'static str, llm: Arc<CountingLlm>, dir: &Path) -> Pipeline {
        let embedder: Arc<dyn EmbeddingModel> = Arc::new(HashingEmbedder);
        let builder = IndexBuilder::new(embedder).with_loader(Arc::new(FixedText(text)));
        Pipeline::new(builder, llm, QueryOptions::default(), dir)
    }

    fn upload(name: &str) -> UploadedFile {
        UploadedFile::new(name, MINIMAL_PDF.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_question_before_upload_prompts() {
        let mut session = Session::new();
        let outcome = session.ask("What is this?").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::UploadPrompt));
        assert!(session.transcript().is_empty());
        assert!(!session.is_activated());
    }

    #[tokio::test]
    async fn test_turns_append_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(CountingLlm::default());
        let pipeline = pipeline("Cats sleep a lot. Dogs bark at night.", llm.clone(), dir.path());

        let mut session = Session::new();
        session.process_upload(&pipeline, &upload("pets.pdf")).await.unwrap();
        assert!(session.is_activated());

        for q in ["first?", "second?", "third?"] {
            session.ask(q).await.unwrap();
        }

        let contents: Vec<&str> = session.transcript().messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first?", "answer 1", "second?", "answer 2", "third?", "answer 3"]);
        assert_eq!(session.transcript().messages()[0].marker, USER_MARKER);
        assert_eq!(session.transcript().messages()[1].marker, ASSISTANT_MARKER);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_turn_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline("Some text here.", Arc::new(CountingLlm::default()), dir.path());

        let mut session = Session::new();
        session.process_upload(&pipeline, &upload("doc.pdf")).await.unwrap();

        let err = session.ask("   ").await.unwrap_err();
        assert!(matches!(err, SessionError::Query(QueryError::EmptyQuestion)));
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_failed_build_keeps_previous_engine() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(CountingLlm::default());
        let good = pipeline("Rivers flow to the sea.", llm.clone(), dir.path());
        let bad = pipeline("", llm, dir.path());

        let mut session = Session::new();
        assert!(session.process_upload(&bad, &upload("empty.pdf")).await.is_err());
        assert!(!session.has_engine());
        assert!(!session.is_activated());

        session.process_upload(&good, &upload("rivers.pdf")).await.unwrap();
        assert!(session.process_upload(&bad, &upload("empty.pdf")).await.is_err());
        assert!(session.has_engine());
        assert_eq!(session.document().unwrap().filename, "rivers.pdf");
    }

    #[tokio::test]
    async fn test_rebuild_replaces_engine() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(CountingLlm::default());
        let first = pipeline("Apples are red.", llm.clone(), dir.path());
        let second = pipeline("Bananas are yellow.", llm, dir.path());

        let mut session = Session::new();
        session.process_upload(&first, &upload("apples.pdf")).await.unwrap();
        session.process_upload(&second, &upload("bananas.pdf")).await.unwrap();

        assert_eq!(session.document().unwrap().filename, "bananas.pdf");
        match session.ask("What colour?").await.unwrap() {
            TurnOutcome::Answered(answer) => assert!(answer.sources[0].content.contains("Bananas")),
            TurnOutcome::UploadPrompt => panic!("expected an answer"),
        }
    }

    #[tokio::test]
    async fn test_staging_dir_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(CountingLlm::default());
        let good = pipeline("Rivers flow to the sea.", llm.clone(), dir.path());
        let bad = pipeline("", llm, dir.path());

        let mut session = Session::new();
        session.process_upload(&good, &upload("rivers.pdf")).await.unwrap();
        let _ = session.process_upload(&bad, &upload("empty.pdf")).await;

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_process_without_selection() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline("text", Arc::new(CountingLlm::default()), dir.path());

        let mut session = Session::new();
        let err = session.process_selected(&pipeline).await.unwrap_err();
        assert!(matches!(err, SessionError::Intake(IntakeError::NoFile)));
    }

    #[test]
    fn test_rejected_selection_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("keep.pdf");
        std::fs::write(&pdf, MINIMAL_PDF).unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, b"hello").unwrap();

        let mut session = Session::new();
        session.select_path(&pdf).unwrap();
        assert!(matches!(session.select_path(&txt), Err(SessionError::Intake(IntakeError::UnsupportedType(_)))));
        assert_eq!(session.selected().unwrap().name(), "keep.pdf");
    }
}
