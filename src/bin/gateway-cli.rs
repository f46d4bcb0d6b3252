use axum::http::Method;
use clap::{Parser, Subcommand};
use k256::ecdsa::SigningKey;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use url::{form_urlencoded, Url};

use bridge_gateway::security::authenticate::NONCE_PARAM;
use bridge_gateway::security::pow::{self, Challenge, X_CHALLENGE, X_CHALLENGE_NONCE};
use bridge_gateway::security::signature::{payload_hash, public_key_hex, sign_request};
use bridge_gateway::security::strategy::{X_PUBKEY, X_SIGNATURE};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Client tooling for the bridge gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a secp256k1 key pair
    Keygen,
    /// Print the signature headers for a request without sending it
    Sign {
        #[arg(short, long)]
        key: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
        #[arg(short, long)]
        path: String,
        /// Raw query string (read methods) or body (write methods)
        #[arg(short, long, default_value = "")]
        data: String,
    },
    /// Send a signed request with a fresh nonce
    Send {
        #[arg(short, long)]
        key: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
        #[arg(short, long)]
        path: String,
        /// JSON object of parameters
        #[arg(short, long, default_value = "{}")]
        params: String,
    },
    /// Send a request with basic credentials
    Basic {
        #[arg(long)]
        user: String,
        #[arg(long)]
        secret: String,
        #[arg(short, long, default_value = "/users/me")]
        path: String,
    },
    /// Fetch a proof-of-work challenge, solve it and submit a contact
    Contact {
        #[arg(long, default_value = "{}")]
        contact: String,
        #[arg(long, default_value_t = 1 << 28)]
        max_attempts: u64,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn signing_key(hex_key: &str) -> CliResult<SigningKey> {
    let bytes = hex::decode(hex_key.trim())?;
    Ok(SigningKey::from_slice(&bytes)?)
}

fn fresh_nonce() -> String {
    format!("{:016x}", fastrand::u64(..))
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = Url::parse(&cli.url)?;

    match cli.command {
        Commands::Keygen => {
            let key = SigningKey::random(&mut rand::rngs::OsRng);
            println!("private: {}", hex::encode(key.to_bytes()));
            println!("public:  {}", public_key_hex(&key));
        }
        Commands::Sign {
            key,
            method,
            path,
            data,
        } => {
            let key = signing_key(&key)?;
            let method: Method = method.to_uppercase().parse()?;
            let signature = sign_request(&key, &method, &path, Some(&data), data.as_bytes())?;
            println!("hash:        {}", payload_hash(&method, &path, Some(&data), data.as_bytes())?);
            println!("{}: {}", X_SIGNATURE, signature);
            println!("{}:    {}", X_PUBKEY, public_key_hex(&key));
        }
        Commands::Send {
            key,
            method,
            path,
            params,
        } => {
            let key = signing_key(&key)?;
            let method: Method = method.to_uppercase().parse()?;
            let mut params: Map<String, Value> = serde_json::from_str(&params)?;
            params.insert(NONCE_PARAM.to_string(), Value::String(fresh_nonce()));

            let mut url = base.join(&path)?;
            let request = if matches!(method, Method::POST | Method::PUT | Method::PATCH) {
                let body = serde_json::to_vec(&Value::Object(params))?;
                let signature = sign_request(&key, &method, &path, None, &body)?;
                client
                    .request(method.clone(), url)
                    .header(CONTENT_TYPE, "application/json")
                    .header(X_SIGNATURE, signature)
                    .body(body)
            } else {
                let mut query = form_urlencoded::Serializer::new(String::new());
                for (name, value) in &params {
                    match value {
                        Value::String(s) => query.append_pair(name, s),
                        other => query.append_pair(name, &other.to_string()),
                    };
                }
                let query = query.finish();
                url.set_query(Some(&query));
                let signature = sign_request(&key, &method, &path, Some(&query), &[])?;
                client
                    .request(method.clone(), url)
                    .header(X_SIGNATURE, signature)
            };

            let res = request.header(X_PUBKEY, public_key_hex(&key)).send().await?;
            print_response(res).await?;
        }
        Commands::Basic { user, secret, path } => {
            let res = client
                .get(base.join(&path)?)
                .basic_auth(user, Some(secret))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Contact {
            contact,
            max_attempts,
        } => {
            let challenge: Challenge = client
                .get(base.join("/contacts/challenge")?)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            eprintln!("Solving challenge {} (target {})", challenge.challenge, challenge.target);

            let nonce = pow::solve(&challenge.challenge, &challenge.target, max_attempts)
                .ok_or("No solution found within the attempt limit")?;
            let contact: Value = serde_json::from_str(&contact)?;
            let res = client
                .post(base.join("/contacts")?)
                .header(X_CHALLENGE, &challenge.challenge)
                .header(X_CHALLENGE_NONCE, nonce)
                .json(&contact)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> CliResult<()> {
    let status = res.status();
    for name in ["x-ratelimit-limit", "x-ratelimit-remaining", "x-ratelimit-reset"] {
        if let Some(value) = res.headers().get(name).and_then(|v| v.to_str().ok()) {
            eprintln!("{}: {}", name, value);
        }
    }

    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
