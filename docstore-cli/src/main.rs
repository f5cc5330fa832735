use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use docstore::schema::parse_schema;
use docstore::{Client, SearchQuery};
use serde_json::Value;
use std::path::PathBuf;
use std::process;

type Error = Box<dyn std::error::Error>;

/// docstore CLI - read, write and search JSON documents in Redis
#[derive(Parser)]
#[command(name = "docstore", version, about)]
struct Cli {
    /// Connection string, e.g. `localhost:6379,password=secret,db=1`
    #[arg(long, env = "DOCSTORE_ENDPOINT", default_value = "localhost:6379")]
    endpoint: String,

    /// Document type; selects the key namespace and the index
    #[arg(long = "type", default_value = "document")]
    type_name: String,

    /// Output format
    #[arg(long, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Get a single document by ID
    Get {
        /// Document ID
        id: String,
    },

    /// Write a document, replacing any existing one
    #[command(group(ArgGroup::new("body").required(true).args(["json", "file", "fields"])))]
    Set {
        /// Document ID
        id: String,
        /// Document as inline JSON
        #[arg(long)]
        json: Option<String>,
        /// Read the document from a JSON file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Field values (e.g. --field name="Alice Chen" --field balance=12.5)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete a document
    Delete {
        /// Document ID
        id: String,
    },

    /// Search the type's index (empty query matches everything)
    Search {
        /// Query, e.g. '@balance:[10 100]' or '@department:Toys'
        #[arg(default_value = "")]
        query: String,
        #[arg(long, default_value_t = docstore::query::DEFAULT_OFFSET)]
        offset: usize,
        #[arg(long, default_value_t = docstore::query::DEFAULT_COUNT)]
        count: usize,
        /// Sortable field to order by
        #[arg(long)]
        sort_by: Option<String>,
        /// Sort ascending
        #[arg(long, requires = "sort_by", conflicts_with = "desc")]
        asc: bool,
        /// Sort descending
        #[arg(long, requires = "sort_by")]
        desc: bool,
    },

    /// Drop and recreate the type's index from a YAML schema file
    RebuildIndex {
        #[arg(long)]
        schema: PathBuf,
    },

    /// Drop the type's index, keeping the documents
    DropIndex,

    /// Check the server is reachable
    Ping,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let mut client = Client::<Value>::new(&cli.type_name)?;
    client.connect(&cli.endpoint).await?;

    let result = execute(&client, cli.command).await;
    client.dispose().await?;
    print_output(&result?, &cli.format)
}

async fn execute(client: &Client<Value>, command: Command) -> Result<Value, Error> {
    let output = match command {
        Command::Get { id } => match client.get(&id).await? {
            Some(doc) => doc,
            None => return Err(format!("Document '{id}' not found").into()),
        },

        Command::Set {
            id,
            json,
            file,
            fields,
        } => {
            let doc = match (json, file) {
                (Some(json), _) => serde_json::from_str(&json)?,
                (None, Some(path)) => {
                    let raw = std::fs::read_to_string(&path)
                        .map_err(|e| format!("Failed to read '{}': {e}", path.display()))?;
                    serde_json::from_str(&raw)?
                }
                (None, None) => fields_to_value(&fields),
            };
            let ok = client.set(&id, &doc).await?;
            serde_json::json!({ "ok": ok, "id": id })
        }

        Command::Delete { id } => {
            let deleted = client.delete(&id).await?;
            serde_json::json!({ "ok": true, "deleted": deleted, "id": id })
        }

        Command::Search {
            query,
            offset,
            count,
            sort_by,
            asc,
            desc,
        } => {
            let mut request = SearchQuery::new(&query).limit(offset, count);
            if let Some(field) = &sort_by {
                let ascending = match (asc, desc) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                request = request.sort_by(field, ascending);
            }

            let results = client.search_with(&request).await?;
            let hits: Vec<Value> = results
                .hits
                .into_iter()
                .map(|hit| serde_json::json!({ "id": hit.id, "document": hit.document }))
                .collect();
            serde_json::json!({ "total": results.total, "hits": hits })
        }

        Command::RebuildIndex { schema } => {
            let descriptor = parse_schema(&schema)?;
            client.rebuild_index(&descriptor).await?;
            serde_json::json!({
                "ok": true,
                "index": client.keyspace().index_name(),
                "fields": descriptor.len(),
            })
        }

        Command::DropIndex => {
            let dropped = client.drop_index().await?;
            serde_json::json!({ "ok": true, "dropped": dropped })
        }

        Command::Ping => {
            let elapsed = client.ping().await?;
            serde_json::json!({ "ok": true, "elapsed_ms": elapsed.as_secs_f64() * 1000.0 })
        }
    };

    Ok(output)
}

fn print_output(value: &Value, format: &OutputFormat) -> Result<(), Error> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn fields_to_value(fields: &[(String, String)]) -> Value {
    let mut map = serde_json::Map::new();
    for (key, val) in fields {
        // Numbers, booleans and nested JSON parse as such; anything else is a string
        let json_val = serde_json::from_str(val).unwrap_or_else(|_| Value::String(val.clone()));
        map.insert(key.clone(), json_val);
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("name=Alice=Chen").unwrap(),
            ("name".to_string(), "Alice=Chen".to_string())
        );
        assert!(parse_key_value("name").is_err());
    }

    #[test]
    fn test_fields_to_value() {
        let fields = vec![
            ("name".to_string(), "Ada".to_string()),
            ("balance".to_string(), "12.5".to_string()),
            ("active".to_string(), "true".to_string()),
        ];
        assert_eq!(
            fields_to_value(&fields),
            serde_json::json!({ "name": "Ada", "balance": 12.5, "active": true })
        );
    }

    #[test]
    fn test_cli_parses_search() {
        let cli = Cli::try_parse_from([
            "docstore", "--type", "Account", "search", "@balance:[10 100]", "--count", "50",
            "--sort-by", "balance", "--desc",
        ])
        .unwrap();
        assert_eq!(cli.type_name, "Account");
        match cli.command {
            Command::Search { query, count, sort_by, desc, .. } => {
                assert_eq!(query, "@balance:[10 100]");
                assert_eq!(count, 50);
                assert_eq!(sort_by.as_deref(), Some("balance"));
                assert!(desc);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_set_requires_a_body() {
        assert!(Cli::try_parse_from(["docstore", "set", "1"]).is_err());
        assert!(Cli::try_parse_from(["docstore", "set", "1", "--json", "{}"]).is_ok());
    }
}
