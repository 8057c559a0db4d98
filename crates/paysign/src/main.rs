use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use paysign::{
    ArrayPolicy, CanonicalizationOptions, Certificate, Gateway, KeyMaterialStore,
    NotificationVerifier, ParameterSet, PaysignConfig, RequestSigner, SignatureSchemeId,
    SigningKey, VerificationKey, Verdict, canonicalize,
};

#[derive(Parser)]
#[clap(name = "paysign", about = "Canonicalize, sign and verify payment gateway parameters")]
struct Args {
    #[clap(long, env = "PAYSIGN_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Shared secret for MD5, HMAC-SHA256 and SECURE-KEY, overriding the config.
    #[clap(long, env = "PAYSIGN_SECRET", global = true, hide_env_values = true)]
    secret: Option<String>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the canonical string of a JSON parameter object.
    Canonicalize {
        /// Use this gateway's canonicalization rules instead of the flags below.
        #[clap(long)]
        gateway: Option<Gateway>,
        #[clap(long)]
        url_encode: bool,
        #[clap(long)]
        url_decode: bool,
        #[clap(long, value_enum, default_value = "undeclared")]
        array_policy: ArrayPolicyArg,
        /// JSON file, or `-` for stdin.
        #[clap(default_value = "-")]
        params: PathBuf,
    },
    /// Sign a JSON parameter object and print the signed object.
    Sign {
        #[clap(long)]
        gateway: Gateway,
        /// Defaults to the scheme configured for the gateway.
        #[clap(long)]
        scheme: Option<SignatureSchemeId>,
        #[clap(default_value = "-")]
        params: PathBuf,
    },
    /// Verify a JSON notification. Exits non-zero unless trusted.
    Verify {
        #[clap(long)]
        gateway: Gateway,
        /// Defaults to the scheme the notification declares.
        #[clap(long)]
        scheme: Option<SignatureSchemeId>,
        #[clap(default_value = "-")]
        params: PathBuf,
    },
    /// Describe a certificate or PKCS#12 signing bundle.
    CertInfo {
        path: PathBuf,
        #[clap(long, env = "PAYSIGN_CERT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ArrayPolicyArg {
    Undeclared,
    Skip,
    Flatten,
}

impl From<ArrayPolicyArg> for ArrayPolicy {
    fn from(arg: ArrayPolicyArg) -> Self {
        match arg {
            ArrayPolicyArg::Undeclared => ArrayPolicy::Undeclared,
            ArrayPolicyArg::Skip => ArrayPolicy::Skip,
            ArrayPolicyArg::Flatten => ArrayPolicy::Flatten,
        }
    }
}

fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let args = Args::parse();
    let store = Arc::new(KeyMaterialStore::new());

    match args.command {
        Command::Canonicalize {
            gateway,
            url_encode,
            url_decode,
            array_policy,
            ref params,
        } => {
            let params = read_params(params)?;
            let options = match gateway {
                Some(gateway) => gateway.profile().options,
                None => CanonicalizationOptions {
                    url_encode,
                    url_decode,
                    array_policy: array_policy.into(),
                },
            };
            let canonical = canonicalize(&params, &options).context("canonicalizing parameters")?;
            println!("{canonical}");
        }
        Command::Sign {
            gateway,
            scheme,
            ref params,
        } => {
            let params = read_params(params)?;
            let config = load_config(args.config.as_deref())?;
            let profile = gateway.profile();
            let scheme = match scheme {
                Some(scheme) => scheme,
                None => match profile.declared_scheme(&params)? {
                    Some(scheme) => scheme,
                    None => config.default_scheme(gateway)?,
                },
            };
            let key = match (&args.secret, scheme.is_symmetric()) {
                (Some(secret), true) => SigningKey::secret(secret),
                _ => config
                    .signing_key(gateway, scheme, &store)
                    .context("loading signing key")?,
            };

            let signed = RequestSigner::default()
                .attach_signature(&params, scheme, &key, &profile)
                .context("signing parameters")?;
            println!("{}", serde_json::to_string_pretty(&signed)?);
        }
        Command::Verify {
            gateway,
            scheme,
            ref params,
        } => {
            let params = read_params(params)?;
            let config = load_config(args.config.as_deref())?;
            let profile = gateway.profile();
            let scheme = match scheme {
                Some(scheme) => scheme,
                None => match profile.declared_scheme(&params)? {
                    Some(scheme) => scheme,
                    None => config.default_scheme(gateway)?,
                },
            };
            let key = match (&args.secret, scheme.is_symmetric()) {
                (Some(secret), true) => VerificationKey::secret(secret),
                _ => {
                    let version = params.text("version");
                    config
                        .verification_key(gateway, scheme, version.as_deref(), &store)
                        .context("loading verification key")?
                }
            };

            let verdict = NotificationVerifier::new(Arc::clone(&store))
                .verify(&params, scheme, &key, &profile)
                .context("verifying notification")?;
            let output = match &verdict {
                Verdict::Trusted { fields } => json!({ "verdict": "trusted", "fields": fields }),
                Verdict::Untrusted(reason) => {
                    json!({ "verdict": "untrusted", "reason": reason.as_str() })
                }
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            if !verdict.is_trusted() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::CertInfo { path, password } => {
            let certificate = if is_pkcs12(&path) {
                let password = password.unwrap_or_default();
                let bundle = store
                    .load_signing_bundle(&path, &password)
                    .with_context(|| format!("loading signing bundle {}", path.display()))?;
                Arc::clone(bundle.certificate())
            } else {
                store
                    .load_certificate(&path)
                    .with_context(|| format!("loading certificate {}", path.display()))?
            };
            println!("{}", serde_json::to_string_pretty(&describe(&certificate))?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_config(path: Option<&Path>) -> Result<PaysignConfig> {
    match path {
        Some(path) => PaysignConfig::load(path).context("loading configuration"),
        None => Ok(PaysignConfig::default()),
    }
}

fn read_params(path: &Path) -> Result<ParameterSet> {
    let mut contents = String::new();
    if path == Path::new("-") {
        std::io::stdin()
            .read_to_string(&mut contents)
            .context("reading parameters from stdin")?;
    } else {
        contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading parameters from {}", path.display()))?;
    }

    let value: serde_json::Value =
        serde_json::from_str(&contents).context("parsing parameters as JSON")?;
    let serde_json::Value::Object(map) = value else {
        bail!("parameters must be a JSON object");
    };
    Ok(ParameterSet::from(map))
}

fn is_pkcs12(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            extension.eq_ignore_ascii_case("pfx") || extension.eq_ignore_ascii_case("p12")
        })
}

fn describe(certificate: &Certificate) -> serde_json::Value {
    json!({
        "cert_id": certificate.serial(),
        "common_name": certificate.common_name(),
        "identity": certificate.identity(),
        "not_before": unix_seconds(certificate.not_before()),
        "not_after": unix_seconds(certificate.not_after()),
        "valid_now": certificate.is_valid_at(SystemTime::now()),
    })
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}
