//! Binary entry point for the provenance administrative CLI.
#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use provenance::{
    AgeOffMapping, BulkDocument, CallerIdentity, DocumentRef, EngineConfig, IdClass,
    InheritanceInfo, ProvenanceError, ProvenanceGraph,
};
use serde::Serialize;
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "provenance",
    version,
    about = "Administrative CLI for the provenance lineage graph",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    open: OpenArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(long, global = true, env = "PROVENANCE_CONFIG", help = "Engine config file")]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "PROVENANCE_DB", help = "Graph database file")]
    database: Option<PathBuf>,

    #[arg(long, global = true, env = "PROVENANCE_IDS", help = "Id allocator file")]
    ids: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "PROVENANCE_APPLICATION",
        default_value = "provenance-cli",
        help = "Application stamped on audit fields"
    )]
    application: String,

    #[arg(
        long,
        global = true,
        env = "USER",
        default_value = "cli",
        help = "User stamped on audit fields"
    )]
    user: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or upgrade the schema and reconcile id counters
    Init,
    /// Manage age-off rules
    #[command(subcommand)]
    Rule(RuleCmd),
    /// Create and inspect documents
    #[command(subcommand)]
    Doc(DocCmd),
    /// All ancestors of the given uris
    Ancestors { uris: Vec<String> },
    /// All descendants of the given uris
    Descendants { uris: Vec<String> },
    /// Documents eligible for deletion under a rule
    AgeOff {
        rule_id: i64,
        #[arg(long, value_parser = parse_date, help = "Evaluate as of this RFC 3339 time")]
        as_of: Option<OffsetDateTime>,
    },
    /// Manage purge campaigns
    #[command(subcommand)]
    Purge(PurgeCmd),
    /// Permanently mark documents aged
    MarkAged { ids: Vec<i64> },
}

#[derive(Subcommand, Debug)]
enum RuleCmd {
    Add {
        name: String,
        #[command(flatten)]
        duration: DurationArgs,
        #[arg(long, default_value_t = 7, help = "Maximum execution period in days")]
        period: u32,
    },
    Show {
        name: String,
    },
    List {
        #[arg(long, default_value_t = 0)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        page: usize,
    },
    Update {
        name: String,
        #[command(flatten)]
        duration: DurationArgs,
        #[arg(long)]
        period: Option<u32>,
    },
}

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct DurationArgs {
    #[arg(long)]
    days: Option<i64>,
    #[arg(long)]
    seconds: Option<i64>,
}

impl DurationArgs {
    fn duration(&self) -> Result<Duration, ProvenanceError> {
        match (self.days, self.seconds) {
            (Some(days), _) => days
                .checked_mul(SECONDS_PER_DAY)
                .map(Duration::seconds)
                .ok_or_else(|| ProvenanceError::InvalidArgument(format!("--days {days} is out of range"))),
            (None, Some(seconds)) => Ok(Duration::seconds(seconds)),
            (None, None) => Ok(Duration::ZERO),
        }
    }
}

#[derive(Subcommand, Debug)]
enum DocCmd {
    Add {
        uri: String,
        #[arg(long = "parent", help = "Parent whose rules are inherited and tracked")]
        parents: Vec<String>,
        #[arg(long = "link", help = "Parent recorded for lineage only")]
        links: Vec<String>,
        #[arg(long = "rule", value_parser = parse_mapping, help = "RULE_ID or RULE_ID@RFC3339")]
        rules: Vec<AgeOffMapping>,
    },
    /// Create documents from a JSON array of {uri, parents, age_off_rules}
    Bulk {
        file: PathBuf,
        #[arg(long = "rule", value_parser = parse_mapping)]
        rules: Vec<AgeOffMapping>,
    },
    Info {
        document: String,
    },
    Attach {
        document: String,
        #[arg(long, value_parser = parse_mapping)]
        rule: AgeOffMapping,
    },
    Detach {
        document: String,
        #[arg(long)]
        rule: i64,
    },
    Inherit {
        document: String,
        #[arg(long)]
        parent: String,
        #[arg(long, help = "Copy current rules without tracking later changes")]
        no_track: bool,
        #[arg(long, value_parser = parse_date)]
        relevant: Option<OffsetDateTime>,
    },
    Uninherit {
        document: String,
        #[arg(long)]
        parent: String,
    },
}

#[derive(Subcommand, Debug)]
enum PurgeCmd {
    Mark {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        uris: Vec<String>,
    },
    Update {
        purge_id: i64,
        #[arg(long, value_delimiter = ',')]
        ids: Vec<i64>,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        resolved: bool,
    },
    Show {
        purge_id: i64,
    },
    List,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = EngineConfig::load(cli.open.config.clone())?;
    init_tracing(config.log_filter.as_deref());

    if let Some(database) = &cli.open.database {
        config.database = Some(database.clone());
    }
    let database = config
        .database
        .get_or_insert_with(|| PathBuf::from("provenance.db"))
        .clone();
    if let Some(ids) = &cli.open.ids {
        config.id_allocator = Some(ids.clone());
    }
    config
        .id_allocator
        .get_or_insert_with(|| database.with_extension("ids.db"));

    let graph = ProvenanceGraph::from_config(config)?;
    let who = CallerIdentity::new(cli.open.application.as_str(), cli.open.user.as_str());

    match cli.command {
        Command::Init => {
            let mut counters = serde_json::Map::new();
            for class in IdClass::ALL {
                counters.insert(
                    class.as_str().to_owned(),
                    graph.id_allocator().current_value(class)?.into(),
                );
            }
            emit(&json!({ "database": database, "ids": counters }))?;
        }
        Command::Rule(cmd) => run_rule(&graph, &who, cmd)?,
        Command::Doc(cmd) => run_doc(&graph, &who, cmd)?,
        Command::Ancestors { uris } => emit(&graph.ancestors_of(&uris)?)?,
        Command::Descendants { uris } => emit(&graph.descendants_of(&uris)?)?,
        Command::AgeOff { rule_id, as_of } => emit(&graph.compute_expired(rule_id, as_of)?)?,
        Command::Purge(cmd) => run_purge(&graph, &who, cmd)?,
        Command::MarkAged { ids } => emit(&json!({ "aged": graph.mark_aged(&ids)? }))?,
    }
    Ok(())
}

fn run_rule(graph: &ProvenanceGraph, who: &CallerIdentity, cmd: RuleCmd) -> Result<(), Box<dyn Error>> {
    match cmd {
        RuleCmd::Add {
            name,
            duration,
            period,
        } => {
            let rule_id = graph.add_age_off_rule(who, &name, duration.duration()?, period)?;
            emit(&json!({ "rule_id": rule_id }))
        }
        RuleCmd::Show { name } => emit(&graph.age_off_rule(&name)?),
        RuleCmd::List { limit, page } => emit(&json!({
            "count": graph.count_age_off_rules()?,
            "rules": graph.all_age_off_rules(limit, page)?,
        })),
        RuleCmd::Update {
            name,
            duration,
            period,
        } => {
            graph.update_age_off_rule(who, &name, duration.duration()?, period)?;
            emit(&graph.age_off_rule(&name)?)
        }
    }
}

fn run_doc(graph: &ProvenanceGraph, who: &CallerIdentity, cmd: DocCmd) -> Result<(), Box<dyn Error>> {
    match cmd {
        DocCmd::Add {
            uri,
            parents,
            links,
            rules,
        } => {
            let mut inheritance: Vec<InheritanceInfo> =
                parents.into_iter().map(InheritanceInfo::inheriting).collect();
            inheritance.extend(links.into_iter().map(|uri| InheritanceInfo::new(uri, false, false)));
            let document_id = graph.create_document(who, &uri, &inheritance, &rules)?;
            emit(&json!({ "uri": uri, "document_id": document_id }))
        }
        DocCmd::Bulk { file, rules } => {
            let contents = fs::read_to_string(&file)?;
            let documents: Vec<BulkDocument> = serde_json::from_str(&contents)?;
            emit(&graph.bulk_create(who, documents, &rules)?)
        }
        DocCmd::Info { document } => emit(&graph.document_info(&document_ref(&document))?),
        DocCmd::Attach { document, rule } => {
            graph.attach_explicit_rule(who, &document_ref(&document), rule)?;
            emit(&graph.document_info(&document_ref(&document))?)
        }
        DocCmd::Detach { document, rule } => {
            graph.detach_explicit_rule(who, &document_ref(&document), rule)?;
            emit(&graph.document_info(&document_ref(&document))?)
        }
        DocCmd::Inherit {
            document,
            parent,
            no_track,
            relevant,
        } => {
            let mut info = InheritanceInfo::new(parent, true, !no_track);
            info.age_off_relevant_date = relevant;
            graph.add_inheritance_relationship(who, &document_ref(&document), info)?;
            emit(&graph.document_info(&document_ref(&document))?)
        }
        DocCmd::Uninherit { document, parent } => {
            graph.detach_inherited_rule(who, &document_ref(&document), &parent)?;
            emit(&graph.document_info(&document_ref(&document))?)
        }
    }
}

fn run_purge(graph: &ProvenanceGraph, who: &CallerIdentity, cmd: PurgeCmd) -> Result<(), Box<dyn Error>> {
    match cmd {
        PurgeCmd::Mark {
            name,
            description,
            uris,
        } => emit(&graph.mark_for_purge(who, &uris, &name, &description)?),
        PurgeCmd::Update {
            purge_id,
            ids,
            note,
            resolved,
        } => {
            let ids: BTreeSet<i64> = ids.into_iter().collect();
            emit(&graph.record_completion(who, purge_id, &ids, note.as_deref(), resolved)?)
        }
        PurgeCmd::Show { purge_id } => emit(&graph.purge_info(purge_id)?),
        PurgeCmd::List => emit(&json!({ "purge_ids": graph.all_purge_ids()? })),
    }
}

/// Positive integers name a document id, anything else a uri.
fn document_ref(raw: &str) -> DocumentRef {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => DocumentRef::Id(id),
        _ => DocumentRef::uri(raw),
    }
}

fn parse_date(raw: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|err| format!("invalid RFC 3339 time '{raw}': {err}"))
}

fn parse_mapping(raw: &str) -> Result<AgeOffMapping, String> {
    let (rule, date) = match raw.split_once('@') {
        Some((rule, date)) => (rule, parse_date(date)?),
        None => (raw, OffsetDateTime::now_utc()),
    };
    let rule_id = rule
        .parse::<i64>()
        .map_err(|err| format!("invalid rule id '{rule}': {err}"))?;
    Ok(AgeOffMapping::new(rule_id, date))
}

fn emit<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

fn init_tracing(configured: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or("warn")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}
