use std::fmt;
use std::io::Write;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::cli::{
    AddKeyArgs, CliCommand, CreateProjectArgs, DeleteKeyArgs, KeysArgs, LanguageArgs, SetArgs,
    UpdateProjectArgs,
};
use crate::core::{
    filter_keys, KeyDraft, KeyFilter, Project, ProjectChanges, ProjectDraft, Session,
    TranslationKey, TranslationValues,
};

/// Runs one command against `session`, writing human-readable text (or JSON when `json` is
/// set) to `writer`.
pub async fn execute<W: Write>(
    session: &Session,
    command: CliCommand,
    json: bool,
    mut writer: W,
) -> Result<()> {
    let out = Output {
        json,
        writer: &mut writer,
    };
    match command {
        CliCommand::Projects => handle_projects(session, out).await,
        CliCommand::Project(args) => handle_project(session, &args.project, out).await,
        CliCommand::Keys(args) => handle_keys(session, &args, out).await,
        CliCommand::Key(args) => handle_key(session, &args.id, out).await,
        CliCommand::Categories(args) => {
            let categories = session.queries().categories(args.project.as_deref()).await?;
            out.list(&categories, "No categories")
        }
        CliCommand::Stats(args) => handle_stats(session, &args.project, out).await,
        CliCommand::Localizations(args) => {
            let table = session
                .queries()
                .localizations(&args.project, &args.locale)
                .await?
                .ok_or_else(|| anyhow!("project {} not found", args.project))?;
            out.render(&table, |writer| {
                for (key, value) in &table.localizations {
                    writeln!(writer, "{key} = {value}")?;
                }
                Ok(())
            })
        }
        CliCommand::AddKey(args) => handle_add_key(session, args, out).await,
        CliCommand::Set(args) => handle_set(session, args, out).await,
        CliCommand::DeleteKey(args) => handle_delete_keys(session, &args, out).await,
        CliCommand::AddLanguage(args) => handle_add_language(session, &args, out).await,
        CliCommand::RemoveLanguage(args) => handle_remove_language(session, &args, out).await,
        CliCommand::CreateProject(args) => handle_create_project(session, args, out).await,
        CliCommand::UpdateProject(args) => handle_update_project(session, args, out).await,
        CliCommand::DeleteProject(args) => {
            session
                .coordinator()
                .delete_project(&args.project)
                .await?;
            out.message(&format!("Deleted project {}", args.project))
        }
    }
}

struct Output<'a, W: Write> {
    json: bool,
    writer: &'a mut W,
}

impl<W: Write> Output<'_, W> {
    fn render<T: Serialize>(
        self,
        value: &T,
        human: impl FnOnce(&mut W) -> std::io::Result<()>,
    ) -> Result<()> {
        if self.json {
            serde_json::to_writer_pretty(&mut *self.writer, value)?;
            writeln!(self.writer)?;
        } else {
            human(self.writer)?;
        }
        Ok(())
    }

    fn list(self, items: &[String], empty: &str) -> Result<()> {
        self.render(&items, |writer| {
            if items.is_empty() {
                writeln!(writer, "{empty}")?;
            }
            for item in items {
                writeln!(writer, "{item}")?;
            }
            Ok(())
        })
    }

    fn message(self, text: &str) -> Result<()> {
        #[derive(Serialize)]
        struct Message<'a> {
            message: &'a str,
        }
        self.render(&Message { message: text }, |writer| writeln!(writer, "{text}"))
    }
}

async fn handle_projects<W: Write>(session: &Session, out: Output<'_, W>) -> Result<()> {
    let projects = session.queries().projects().await?;
    out.render(&projects, |writer| {
        if projects.is_empty() {
            writeln!(writer, "No projects")?;
        }
        for project in &projects {
            writeln!(writer, "{}", ProjectLine(project))?;
        }
        Ok(())
    })
}

async fn handle_project<W: Write>(session: &Session, id: &str, out: Output<'_, W>) -> Result<()> {
    let project = session
        .queries()
        .project(id)
        .await?
        .ok_or_else(|| anyhow!("project {id} not found"))?;
    session.selection().select_project(Some(&project.id));
    out.render(&project, |writer| {
        writeln!(writer, "{} ({})", project.name, project.id)?;
        if let Some(description) = &project.description {
            writeln!(writer, "  {description}")?;
        }
        writeln!(writer, "  default language: {}", project.default_language)?;
        writeln!(writer, "  languages: {}", project.supported_languages.join(", "))?;
        writeln!(writer, "  keys: {}", project.translation_key_count)?;
        writeln!(writer, "  active: {}", if project.is_active { "yes" } else { "no" })?;
        writeln!(
            writer,
            "  created {} by {}",
            project.created_at.format("%Y-%m-%d"),
            project.created_by
        )
    })
}

async fn handle_keys<W: Write>(session: &Session, args: &KeysArgs, out: Output<'_, W>) -> Result<()> {
    let keys = session.queries().keys(args.project.as_deref()).await?;
    let filter = KeyFilter {
        search: args.search.clone().unwrap_or_default(),
        categories: args.category.iter().map(|c| c.trim().to_string()).collect(),
        languages: args.languages.iter().map(|l| l.trim().to_string()).collect(),
    };
    session.selection().set_filter(filter.clone());
    let visible = filter_keys(&keys, &filter);

    out.render(&visible, |writer| {
        for key in &visible {
            write_key(writer, key)?;
        }
        match filter.summary() {
            Some(summary) => writeln!(
                writer,
                "Showing {} of {} keys ({summary})",
                visible.len(),
                keys.len()
            ),
            None => writeln!(writer, "{}", CountLine::keys(visible.len())),
        }
    })
}

async fn handle_key<W: Write>(session: &Session, id: &str, out: Output<'_, W>) -> Result<()> {
    let key = session
        .queries()
        .key(id)
        .await?
        .ok_or_else(|| anyhow!("translation key {id} not found"))?;
    out.render(&key, |writer| {
        write_key(writer, &key)?;
        if let Some(description) = &key.description {
            writeln!(writer, "  {description}")?;
        }
        Ok(())
    })
}

async fn handle_stats<W: Write>(session: &Session, id: &str, out: Output<'_, W>) -> Result<()> {
    let stats = session
        .queries()
        .project_stats(id)
        .await?
        .ok_or_else(|| anyhow!("project {id} not found"))?;
    out.render(&stats, |writer| {
        writeln!(writer, "{}", CountLine::keys(stats.total_keys))?;
        writeln!(writer, "Categories: {}", stats.categories.join(", "))?;
        for language in &stats.supported_languages {
            if let Some(entry) = stats.language_stats.get(language) {
                writeln!(
                    writer,
                    "  {language:<4} {:>3}/{:<3} {:>5.1}%",
                    entry.translated, entry.total, entry.completion_percentage
                )?;
            }
        }
        Ok(())
    })
}

async fn handle_add_key<W: Write>(session: &Session, args: AddKeyArgs, out: Output<'_, W>) -> Result<()> {
    let draft = KeyDraft {
        key: args.key,
        category: args.category,
        description: args.description,
        translations: collect_values(args.values),
    };
    let created = session
        .coordinator()
        .create_translation_key(&args.project, &draft)
        .await?;
    out.render(&created, |writer| {
        writeln!(writer, "Created key {} ({})", created.key, created.id)
    })
}

async fn handle_set<W: Write>(session: &Session, args: SetArgs, out: Output<'_, W>) -> Result<()> {
    // Load the key first so unchanged values are detected locally.
    if session.queries().key(&args.id).await?.is_none() {
        return Err(anyhow!("translation key {} not found", args.id));
    }
    let values = collect_values(args.values);
    let updated = session
        .coordinator()
        .update_translation_key(&args.id, &values)
        .await?;
    match updated {
        Some(key) => out.render(&key, |writer| {
            writeln!(writer, "Updated {}", key.key)?;
            write_values(writer, &key)
        }),
        None => out.message("No changes to submit"),
    }
}

async fn handle_delete_keys<W: Write>(
    session: &Session,
    args: &DeleteKeyArgs,
    out: Output<'_, W>,
) -> Result<()> {
    let mut summary = DeleteSummary::default();
    for id in &args.ids {
        match session.coordinator().delete_translation_key(id).await {
            Ok(()) => summary.deleted.push(id.clone()),
            Err(err) if err.is_not_found() => summary.missing.push(id.clone()),
            Err(err) => {
                // Keys already deleted stay deleted; report them before failing.
                if !summary.is_empty() {
                    out.render(&summary, |writer| summary.write_to(writer))?;
                }
                return Err(err.into());
            }
        }
    }
    out.render(&summary, |writer| summary.write_to(writer))
}

async fn handle_add_language<W: Write>(
    session: &Session,
    args: &LanguageArgs,
    out: Output<'_, W>,
) -> Result<()> {
    session
        .coordinator()
        .add_project_language(&args.project, &args.code)
        .await?;
    out.message(&format!("Added {} to {}", args.code.trim(), args.project))
}

async fn handle_remove_language<W: Write>(
    session: &Session,
    args: &LanguageArgs,
    out: Output<'_, W>,
) -> Result<()> {
    session
        .coordinator()
        .remove_project_language(&args.project, &args.code)
        .await?;
    out.message(&format!("Removed {} from {}", args.code.trim(), args.project))
}

async fn handle_create_project<W: Write>(
    session: &Session,
    args: CreateProjectArgs,
    out: Output<'_, W>,
) -> Result<()> {
    let draft = ProjectDraft {
        name: args.name,
        description: args.description,
        default_language: args.default_language,
        supported_languages: args.languages,
    };
    let project = session.coordinator().create_project(&draft).await?;
    out.render(&project, |writer| {
        writeln!(writer, "Created project {} ({})", project.name, project.id)
    })
}

async fn handle_update_project<W: Write>(
    session: &Session,
    args: UpdateProjectArgs,
    out: Output<'_, W>,
) -> Result<()> {
    session.queries().project(&args.project).await?;
    let changes = ProjectChanges {
        name: args.name,
        description: args.description,
        supported_languages: (!args.languages.is_empty()).then_some(args.languages),
        is_active: args.active,
    };
    match session
        .coordinator()
        .update_project(&args.project, &changes)
        .await?
    {
        Some(project) => out.render(&project, |writer| {
            writeln!(writer, "Updated project {}", ProjectLine(&project))
        }),
        None => out.message("No changes to submit"),
    }
}

fn collect_values(pairs: Vec<(String, String)>) -> TranslationValues {
    pairs.into_iter().collect()
}

fn write_key<W: Write>(writer: &mut W, key: &TranslationKey) -> std::io::Result<()> {
    writeln!(writer, "{}  {}  [{}]", key.id, key.key, key.category)?;
    write_values(writer, key)
}

fn write_values<W: Write>(writer: &mut W, key: &TranslationKey) -> std::io::Result<()> {
    for (language, translation) in &key.translations {
        writeln!(
            writer,
            "    {language}: {}  ({})",
            translation.value, translation.updated_by
        )?;
    }
    Ok(())
}

struct ProjectLine<'a>(&'a Project);

impl fmt::Display for ProjectLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let project = self.0;
        write!(
            f,
            "{}  {}  [{}] {}  {}",
            project.id,
            project.name,
            project.default_language,
            project.supported_languages.join(","),
            CountLine::keys(project.translation_key_count)
        )?;
        if !project.is_active {
            write!(f, "  (inactive)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize)]
struct DeleteSummary {
    deleted: Vec<String>,
    missing: Vec<String>,
}

impl DeleteSummary {
    fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.missing.is_empty()
    }

    fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writeln!(writer, "{}", SummaryLine::deleted(self.deleted.len()))?;
        if !self.missing.is_empty() {
            writeln!(writer, "Not found: {}", self.missing.join(", "))?;
        }
        Ok(())
    }
}

enum SummaryLine {
    Deleted(usize),
    NoneDeleted,
}

impl SummaryLine {
    fn deleted(count: usize) -> Self {
        if count > 0 {
            SummaryLine::Deleted(count)
        } else {
            SummaryLine::NoneDeleted
        }
    }
}

impl fmt::Display for SummaryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryLine::Deleted(count) => write!(f, "Deleted {}", CountLine::keys(*count)),
            SummaryLine::NoneDeleted => write!(f, "No keys deleted"),
        }
    }
}

struct CountLine(usize);

impl CountLine {
    fn keys(count: usize) -> Self {
        CountLine(count)
    }
}

impl fmt::Display for CountLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} key{}", self.0, if self.0 == 1 { "" } else { "s" })
    }
}
