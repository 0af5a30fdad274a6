//! REPL – Read-Eval-Print Loop for the Mnemos shell.
//!
//! Each line is parsed by [`command::parse`](crate::command::parse) and run
//! against a [`Session`], which owns the memory manager for the lifetime of
//! the shell. Storage failures are reported and the loop carries on.

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mnemos_memory::semantic::SemanticMemory;
use mnemos_memory::structured::{Definition, StructuredMemory};
use mnemos_memory::visual::VisualMemory;
use mnemos_memory::{MemoryError, MemoryManager, MemoryMerger, RetrieveOptions};
use mnemos_runtime::{Intent, IntentClassifier, LlmDriver};
use mnemos_types::{MemoryObject, NewMemory, VisualAnnotation};
use tracing::warn;

use crate::command::{self, Command, USAGE};
use crate::config::{self, Config};
use crate::ollama;

/// Whether the loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Everything a running shell needs.
pub struct Session {
    pub(crate) manager: MemoryManager,
    merger: MemoryMerger,
    classifier: Option<IntentClassifier<LlmDriver>>,
    cfg: Config,
}

fn build_classifier(cfg: &Config) -> Option<IntentClassifier<LlmDriver>> {
    cfg.classifier_enabled.then(|| {
        let driver = LlmDriver::new(&cfg.ollama_url, &cfg.active_model)
            .response_schema("intent", Intent::json_schema());
        IntentClassifier::new(driver)
    })
}

impl Session {
    pub fn new(manager: MemoryManager, cfg: Config) -> Self {
        Self {
            manager,
            merger: MemoryMerger::new(),
            classifier: build_classifier(&cfg),
            cfg,
        }
    }

    fn set_config(&mut self, cfg: Config) {
        self.classifier = build_classifier(&cfg);
        self.cfg = cfg;
    }

    /// Run one parsed command.
    pub fn execute(&mut self, cmd: Command) -> Result<Flow, MemoryError> {
        match cmd {
            Command::New { entity_type, name } => {
                let memory = self.manager.create(NewMemory::new(name, entity_type))?;
                println!(
                    "{} {} {}",
                    "✓ Created".green(),
                    memory.id().as_str().bold(),
                    format!("({})", memory.structured.entity_type).dimmed()
                );
            }
            Command::Define { id, function } => {
                let changed = StructuredMemory::new(&mut self.manager)
                    .define(&id, Definition::default().function(function))?;
                self.report(&id, changed);
            }
            Command::Describe { id, description } => {
                let changed = StructuredMemory::new(&mut self.manager)
                    .define(&id, Definition::default().description(description))?;
                self.report(&id, changed);
            }
            Command::Alias { id, alias } => {
                let changed = StructuredMemory::new(&mut self.manager)
                    .add_requirements(&id, &[alias.as_str()], &[])?;
                self.report(&id, changed);
            }
            Command::Constraint { id, constraint } => {
                let changed = StructuredMemory::new(&mut self.manager)
                    .add_requirements(&id, &[], &[constraint.as_str()])?;
                self.report(&id, changed);
            }
            Command::Text { id, text, language } => {
                let changed = SemanticMemory::new(&mut self.manager).add_text(
                    &id,
                    &text,
                    language.as_deref(),
                )?;
                self.report(&id, changed);
            }
            Command::Visual {
                id,
                image_id,
                bbox,
                view_angle,
            } => {
                let mut annotation = VisualAnnotation::new(image_id, bbox);
                if let Some(angle) = view_angle {
                    annotation = annotation.view_angle(angle);
                }
                let changed = VisualMemory::new(&mut self.manager).add_visual(&id, annotation)?;
                self.report(&id, changed);
            }
            Command::Confidence { id, image_id, value } => {
                let changed = VisualMemory::new(&mut self.manager)
                    .update_confidence(&id, &image_id, value)?;
                self.report(&id, changed);
            }
            Command::Show { id } => match self.manager.get(&id)? {
                Some(memory) => print_memory(&memory),
                None => println!("{} {}", "No memory".yellow(), id.bold()),
            },
            Command::Find { name } => {
                let found = self.manager.find_by_name(&name)?;
                if found.is_empty() {
                    println!("{} '{}'", "No memory named".yellow(), name);
                }
                for memory in &found {
                    print_summary(memory);
                }
            }
            Command::List => {
                if self.manager.is_empty() {
                    println!("{}", "No memories yet. Try /new.".dimmed());
                }
                for memory in self.manager.iter() {
                    print_summary(memory);
                }
            }
            Command::Search {
                query,
                require_visual,
            } => self.search(&query, require_visual)?,
            Command::Explain { query } => {
                let report = self.merger.explain(&self.manager, &query);
                if report.is_empty() {
                    println!("{}", "No candidates.".dimmed());
                }
                for entry in &report {
                    println!(
                        "  {} {}  usage={} visual={} complete={} updated={} score≈{:.2}",
                        entry.id.as_str().bold(),
                        entry.name,
                        entry.usage_count,
                        entry.has_visual,
                        entry.is_complete,
                        mnemos_types::format_timestamp(&entry.last_updated),
                        entry.score
                    );
                }
            }
            Command::Delete { id } => {
                if self.manager.delete(&id)? {
                    println!("{} {}", "✓ Deleted".green(), id.bold());
                } else {
                    println!("{} {}", "No memory".yellow(), id.bold());
                }
            }
            Command::Ask { utterance } => self.ask(&utterance)?,
            Command::Models { switch_to } => self.models(switch_to),
            Command::Settings => self.settings(),
            Command::Help => print_help(),
            Command::Quit => {
                println!("{}", "Goodbye.".green());
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    fn report(&self, id: &str, changed: bool) {
        if changed {
            println!("{} {}", "✓ Updated".green(), id.bold());
        } else if self.manager.contains(id) {
            println!("{}", "Nothing new; memory unchanged.".dimmed());
        } else {
            println!("{} {}", "No memory".yellow(), id.bold());
        }
    }

    fn search(&mut self, query: &str, require_visual: bool) -> Result<(), MemoryError> {
        let options = RetrieveOptions::default()
            .require_visual(require_visual)
            .top_k(self.cfg.top_k);
        let hits = self.merger.retrieve(&mut self.manager, query, options)?;
        if hits.is_empty() {
            println!("{}", "Nothing matched.".dimmed());
        }
        for (rank, hit) in hits.iter().enumerate() {
            print!("  {}. {} ", rank + 1, format!("{:.2}", hit.score).cyan());
            print_summary(&hit.memory);
        }
        Ok(())
    }

    fn ask(&mut self, utterance: &str) -> Result<(), MemoryError> {
        let intent = match &self.classifier {
            Some(classifier) => Intent::or_general_talk(classifier.classify(utterance)),
            None => Intent::SearchMemory,
        };
        println!("  {} {}", "intent:".dimmed(), intent.to_string().bold());
        match intent {
            Intent::SearchMemory => self.search(utterance, false)?,
            Intent::SaveSpec => println!(
                "  Start with {} then add details with {} and {}.",
                "/new <type> <name>".bold().cyan(),
                "/define".bold().cyan(),
                "/text".bold().cyan()
            ),
            Intent::GeneralTalk => println!("  {}", utterance.italic()),
        }
        Ok(())
    }

    fn models(&mut self, switch_to: Option<String>) {
        println!("{}", "AI Models".bold().underline());
        println!("  Active model : {}", self.cfg.active_model.yellow());
        print!("  Probing Ollama at {} … ", self.cfg.ollama_url.dimmed());
        io::stdout().flush().ok();

        let models = match ollama::fetch_models(&self.cfg.ollama_url) {
            Ok(models) => models,
            Err(e) => {
                println!("{}", "offline".red());
                println!("  {}", e.to_string().dimmed());
                return;
            }
        };
        println!("{}", "online".green());
        for m in &models {
            let marker = if m.name == self.cfg.active_model { "▶" } else { " " };
            println!("    {} {}", marker.green(), m.name.bold());
        }

        let Some(name) = switch_to else { return };
        if !models.iter().any(|m| m.name == name) {
            println!("{} '{}'", "Unknown model:".red(), name.yellow());
            return;
        }
        let mut cfg = self.cfg.clone();
        cfg.active_model = name.clone();
        match config::save(&cfg) {
            Ok(()) => println!("{} {}", "✓ Active model set to".green(), name.bold()),
            Err(e) => println!("{}: {}", "Error saving config".red(), e),
        }
        self.set_config(cfg);
    }

    fn settings(&mut self) {
        let mut cfg = self.cfg.clone();
        println!("{}", "Settings Editor".bold().underline());
        println!("  (press Enter to keep the current value)");

        let top_k = prompt_line(&format!("  Results per search [{}]: ", cfg.top_k), "");
        if let Ok(k) = top_k.parse() {
            cfg.top_k = k;
        }
        cfg.ollama_url = prompt_line(
            &format!("  Ollama URL [{}]: ", cfg.ollama_url),
            &cfg.ollama_url,
        );
        cfg.active_model = prompt_line(
            &format!("  Active model [{}]: ", cfg.active_model),
            &cfg.active_model,
        );
        let enabled = prompt_line(
            &format!("  Classify /ask with the model (y/n) [{}]: ", yes_no(cfg.classifier_enabled)),
            "",
        );
        match enabled.to_lowercase().as_str() {
            "y" | "yes" => cfg.classifier_enabled = true,
            "n" | "no" => cfg.classifier_enabled = false,
            _ => {}
        }
        let db_path = prompt_line(&format!("  Database [{}]: ", cfg.db_path.display()), "");
        if !db_path.is_empty() {
            cfg.db_path = db_path.into();
            println!("  {}", "The new database is used from the next start.".dimmed());
        }

        match config::save(&cfg) {
            Ok(()) => println!(
                "{} {}",
                "✓ Settings saved to".green(),
                config::config_path().display().to_string().bold()
            ),
            Err(e) => println!("{}: {}", "Error saving config".red(), e),
        }
        self.set_config(cfg);
    }
}

/// Read lines from stdin until EOF, `/quit` or the shutdown flag.
pub fn run(mut session: Session, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "mnemos>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }
        if line.trim().is_empty() || shutdown.load(Ordering::SeqCst) {
            continue;
        }

        let cmd = match command::parse(&line) {
            Ok(cmd) => cmd,
            Err(e) => {
                println!("{} {}", "✗".red(), e);
                continue;
            }
        };
        match session.execute(cmd) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => {
                warn!(error = %e, "command failed");
                println!("{}: {}", "Storage error".red(), e);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output helpers
// ─────────────────────────────────────────────────────────────────────────────

fn print_help() {
    println!();
    println!("{}", "Mnemos Commands".bold().underline());
    for (usage, about) in USAGE {
        println!("  {:<46} {}", usage.bold().cyan(), about);
    }
    println!();
}

fn print_summary(memory: &MemoryObject) {
    let s = &memory.structured;
    println!(
        "{} {} {} {}",
        memory.id().as_str().bold(),
        s.name,
        format!("[{}]", s.entity_type).dimmed(),
        format!("used {}×", memory.usage_count()).dimmed()
    );
}

fn print_memory(memory: &MemoryObject) {
    let s = &memory.structured;
    println!("{} {}", s.name.bold(), format!("({})", memory.id()).dimmed());
    println!("  type        : {}", s.entity_type);
    println!("  function    : {}", or_dash(&s.function));
    println!("  description : {}", or_dash(&s.description));
    if let Some(device) = &s.device {
        println!("  device      : {device}");
    }
    if let Some(domain) = &s.domain {
        println!("  domain      : {domain}");
    }
    if !s.aliases.is_empty() {
        println!("  aliases     : {}", s.aliases.join(", "));
    }
    for constraint in &s.constraints {
        println!("  constraint  : {constraint}");
    }
    for text in &memory.semantic.texts {
        println!("  text        : {text}");
    }
    for v in memory.visuals() {
        println!(
            "  visual      : {} {} conf={:.2}{}",
            v.image_id,
            v.bbox,
            v.base.confidence(),
            v.view_angle
                .as_deref()
                .map(|a| format!(" angle={a}"))
                .unwrap_or_default()
        );
    }
    println!(
        "  usage       : {} (last {})",
        memory.usage_count(),
        mnemos_types::format_timestamp(&memory.last_accessed_at())
    );
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn yes_no(value: bool) -> &'static str {
    if value { "y" } else { "n" }
}

pub(crate) fn prompt_line(msg: &str, default: &str) -> String {
    print!("{msg}");
    io::stdout().flush().ok();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim();
            if t.is_empty() { default.to_string() } else { t.to_string() }
        }
        Err(_) => default.to_string(),
    }
}
