use std::fmt;

use anyhow::Result;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use patchbay_types::{Args, CommandOutcome};

use crate::docs::{collapse_doc, render_markdown_reference};

/// Boxed handler invoked for a registered command.
pub type Handler = Box<dyn Fn(&Args) -> Result<CommandOutcome> + Send + Sync>;

/// Name of the generated command returning the flattened doc map.
pub const DOCS_COMMAND: &str = "docs";

/// Name of the generated command returning the markdown reference page.
pub const DOCS_MD_COMMAND: &str = "docs_md";

/// Name of the key-bootstrap command, reachable without a valid key.
pub const GET_APIKEY_COMMAND: &str = "get_apikey";

/// Name of the image proxy command, whose binary payload bypasses the
/// response envelope.
pub const IMAGE_COMMAND: &str = "image_proxy";

/// Prefix marking internal plumbing that is never exposed as a command.
const INTERNAL_PREFIX: char = '_';

const DOCS_DOC: &str = "Return the api docs as a map where commands are keys, descriptions are values.";
const DOCS_MD_DOC: &str = "Return the api docs formatted with markdown.";

/// A single named API operation.
pub struct Command {
    name: String,
    doc: Option<String>,
    params: Vec<String>,
    handler: Handler,
}

impl Command {
    /// Create a command from a name and its handler.
    pub fn new(
        name: impl Into<String>,
        handler: impl Fn(&Args) -> Result<CommandOutcome> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            doc: None,
            params: Vec::new(),
            handler: Box::new(handler),
        }
    }

    /// Attach the documentation block rendered by `docs` and `docs_md`.
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Declare the parameter names this command understands.
    pub fn with_params(mut self, params: &[&str]) -> Self {
        self.params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Run the handler with cleaned request parameters.
    pub fn invoke(&self, args: &Args) -> Result<CommandOutcome> {
        (self.handler)(args)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Immutable command table with its precomputed documentation.
pub struct CommandSet {
    commands: IndexMap<String, Command>,
    docs: Map<String, Value>,
    docs_md: String,
}

impl CommandSet {
    pub fn builder() -> CommandSetBuilder {
        CommandSetBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Comma-separated name list used in operator-facing messages.
    pub fn joined_names(&self) -> String {
        self.names().collect::<Vec<_>>().join(", ")
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Flattened documentation map: command name to one-line doc (or null).
    pub fn docs(&self) -> &Map<String, Value> {
        &self.docs
    }

    /// The full markdown reference page.
    pub fn docs_markdown(&self) -> &str {
        &self.docs_md
    }
}

impl fmt::Debug for CommandSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSet")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder collecting command registrations before the table is frozen.
#[derive(Default)]
pub struct CommandSetBuilder {
    commands: IndexMap<String, Command>,
}

impl CommandSetBuilder {
    /// Register a command. Names starting with `_` are internal plumbing and
    /// are skipped; re-registering a name replaces the earlier entry.
    pub fn register(mut self, command: Command) -> Self {
        if command.name.starts_with(INTERNAL_PREFIX) {
            debug!(name = %command.name, "skipping internal command registration");
            return self;
        }
        if self.commands.contains_key(&command.name) {
            warn!(name = %command.name, "replacing existing command registration");
        }
        self.commands.insert(command.name.clone(), command);
        self
    }

    /// Freeze the table. Documentation for every registered command is
    /// computed here, the `docs` and `docs_md` commands are appended, and
    /// the final table is sorted by name.
    pub fn build(self) -> CommandSet {
        let mut entries: Vec<(String, Option<String>)> = self
            .commands
            .values()
            .map(|command| (command.name.clone(), command.doc.clone()))
            .collect();
        entries.push((DOCS_COMMAND.to_string(), Some(DOCS_DOC.to_string())));
        entries.push((DOCS_MD_COMMAND.to_string(), Some(DOCS_MD_DOC.to_string())));
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|a, b| a.0 == b.0);

        let docs: Map<String, Value> = entries
            .iter()
            .map(|(name, doc)| {
                let rendered = match doc {
                    Some(text) => Value::String(collapse_doc(text)),
                    None => Value::Null,
                };
                (name.clone(), rendered)
            })
            .collect();
        let docs_md = render_markdown_reference(&entries);

        let docs_payload = Value::Object(docs.clone());
        let docs_md_payload = docs_md.clone();
        let with_builtins = self
            .register(
                Command::new(DOCS_COMMAND, move |_| Ok(CommandOutcome::data(docs_payload.clone())))
                    .with_doc(DOCS_DOC),
            )
            .register(
                Command::new(DOCS_MD_COMMAND, move |_| Ok(CommandOutcome::data(docs_md_payload.clone())))
                    .with_doc(DOCS_MD_DOC),
            );

        let mut commands = with_builtins.commands;
        commands.sort_keys();
        CommandSet { commands, docs, docs_md }
    }
}
