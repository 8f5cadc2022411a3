use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use querysieve_core::{
    map_to_response, ApiException, ApiResponse, FilterError, ParameterBag, QueryFunctionRegistry,
};
use querysieve_storage::{InMemoryStore, Seed};
use serde_json::json;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "querysieve")]
#[command(about = "Query seed files the way the server does", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run a resource's filters against a seed file.
    Query {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        resource: String,
        /// Request parameter, `key=value`. Repeatable.
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Fetch a single record by id instead of listing.
        #[arg(long)]
        object: Option<String>,
        #[arg(long)]
        principal: Option<String>,
    },
    /// Show how a filter-map key resolves to a parameter and query function.
    Resolve { key: String },
    /// Load a seed file and write it back out normalized.
    Dump {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn resolve(registry: &QueryFunctionRegistry, key: &str) -> serde_json::Value {
    let (lookup_key, function) = registry.resolve(key);
    json!({
        "key": key,
        "parameter": lookup_key,
        "function": function.map(|f| f.name()),
    })
}

fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    match cli.cmd {
        Cmd::Query {
            data,
            resource,
            params,
            object,
            principal,
        } => {
            let seed = Seed::load(&data).with_context(|| format!("loading {}", data.display()))?;
            let store = InMemoryStore::new();
            seed.apply(&store)?;
            let res = seed
                .resources
                .get(&resource)
                .ok_or_else(|| anyhow!("no resource named '{}'", resource))?;
            let query = store.query(&res.kind)?;
            let params: ParameterBag = params.into_iter().collect();
            match object {
                Some(id) => {
                    let mut lookup = res.resource.clone();
                    if lookup.lookup_map.is_empty() {
                        lookup.lookup_map.insert("id".into(), "id".into());
                    }
                    let param = lookup.lookup_param().ok_or_else(|| {
                        anyhow!("resource '{}' maps several lookup parameters", resource)
                    })?;
                    let path_params = BTreeMap::from([(param.to_string(), id)]);
                    let record = lookup.object(
                        query,
                        &params,
                        &path_params,
                        principal.as_deref(),
                        QueryFunctionRegistry::global(),
                    )?;
                    writeln!(out, "{}", serde_json::to_string(&record)?)?;
                }
                None => {
                    let query = res.resource.filtered(
                        query,
                        &params,
                        &BTreeMap::new(),
                        principal.as_deref(),
                        QueryFunctionRegistry::global(),
                    )?;
                    for record in query.all()? {
                        writeln!(out, "{}", serde_json::to_string(&record)?)?;
                    }
                }
            }
        }
        Cmd::Resolve { key } => {
            let resolved = resolve(QueryFunctionRegistry::global(), &key);
            writeln!(out, "{}", serde_json::to_string(&resolved)?)?;
        }
        Cmd::Dump { data, out: path } => {
            let seed = Seed::load(&data).with_context(|| format!("loading {}", data.display()))?;
            let store = InMemoryStore::new();
            seed.apply(&store)?;
            Seed::export(&store, seed.resources).write(&path)?;
            writeln!(out, "wrote {}", path.display())?;
        }
    }
    Ok(())
}

/// Structured failures render as the server would answer them.
fn render_failure(err: &anyhow::Error) -> Option<ApiResponse> {
    if let Some(FilterError::Conversion(conv)) = err.downcast_ref::<FilterError>() {
        return Some(ApiResponse::from(&ApiException::from_conversion(conv)));
    }
    map_to_response(err.as_ref())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();
    match run(cli, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match render_failure(&err) {
                Some(resp) => eprintln!("{} {}", resp.status, resp.body),
                None => eprintln!("error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"{
        "collections": {
            "User": {
                "fields": ["name", "age"],
                "records": [
                    {"id": 1, "name": "Jo", "age": 30},
                    {"id": 2, "name": "Ann", "age": 20}
                ]
            }
        },
        "resources": {
            "users": {"kind": "User", "filter_map": {"age_min__int": "age__gte"}},
            "handles": {"kind": "User", "lookup_map": {"handle": "name"}}
        }
    }"#;

    fn seed_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, SEED).unwrap();
        (dir, path)
    }

    fn exec(args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("querysieve").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        run(cli, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn params_need_an_equals_sign() {
        assert_eq!(parse_param("a=b=c").unwrap(), ("a".into(), "b=c".into()));
        assert_eq!(parse_param("a=").unwrap(), ("a".into(), "".into()));
        assert!(parse_param("abc").is_err());
    }

    #[test]
    fn resolve_reports_function() {
        let v = resolve(QueryFunctionRegistry::global(), "created__date");
        assert_eq!(v["parameter"], "created");
        assert_eq!(v["function"], "date");
        let v = resolve(QueryFunctionRegistry::global(), "name");
        assert!(v["function"].is_null());
    }

    #[test]
    fn query_lists_matching_records() {
        let (_dir, path) = seed_file();
        let data = path.to_str().unwrap();
        let out = exec(&["query", "--data", data, "--resource", "users", "-p", "age_min=25"]).unwrap();
        let lines: Vec<serde_json::Value> =
            out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["name"], "Jo");
    }

    #[test]
    fn missing_object_renders_not_found() {
        let (_dir, path) = seed_file();
        let data = path.to_str().unwrap();
        let err = exec(&["query", "--data", data, "--resource", "users", "--object", "9"]).unwrap_err();
        let resp = render_failure(&err).unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body["model"], "User");
    }

    #[test]
    fn bad_conversion_renders_field_error() {
        let (_dir, path) = seed_file();
        let data = path.to_str().unwrap();
        let err =
            exec(&["query", "--data", data, "--resource", "users", "-p", "age_min=x"]).unwrap_err();
        let resp = render_failure(&err).unwrap();
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["field"], "age_min");
    }

    #[test]
    fn object_uses_the_resource_lookup_param() {
        let (_dir, path) = seed_file();
        let data = path.to_str().unwrap();
        let out = exec(&["query", "--data", data, "--resource", "handles", "--object", "Ann"]).unwrap();
        let record: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(record["id"], "2");

        let err = exec(&["query", "--data", data, "--resource", "handles", "--object", "Zed"])
            .unwrap_err();
        assert_eq!(render_failure(&err).unwrap().status, 404);
    }
}
