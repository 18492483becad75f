use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use anonn_common::{
    bucket_signals, describe_age_bucket, describe_count_bucket, describe_tier, evaluate,
    proof_address, rule_address, Address, AgeBucket, CountBucket, EpochConfig,
    PartialUserSignals, RawSignals, RuleDefinition, RuleThresholds, UserSignals,
    DEFAULT_EPOCH_SECONDS, SIGNAL_COUNT,
};
use anonn_oauth::{build_authorization_request, OAuthConfig, Provider};

#[derive(Parser)]
#[command(
    name = "anonn-tools",
    about = "Utility commands for anonn signal buckets, addresses and rules"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bucket raw signal values as the client would before submission.
    Bucket(BucketArgs),
    /// Derive the ledger address of a rule.
    RuleAddress(RuleAddressArgs),
    /// Derive the proof record address for a rule, user and epoch.
    ProofAddress(ProofAddressArgs),
    /// Print the epoch for a timestamp.
    Epoch(EpochArgs),
    /// Build a provider authorization URL with fresh state and PKCE material.
    AuthUrl(AuthUrlArgs),
    /// Evaluate a bucketed signal vector against rule thresholds.
    Evaluate(EvaluateArgs),
}

#[derive(Args)]
struct BucketArgs {
    /// Wallet creation time (RFC 3339).
    #[arg(long)]
    wallet_created_at: Option<DateTime<Utc>>,
    #[arg(long)]
    tx_count: Option<u64>,
    /// Twitter account creation time (RFC 3339).
    #[arg(long)]
    twitter_created_at: Option<DateTime<Utc>>,
    /// GitHub account creation time (RFC 3339).
    #[arg(long)]
    github_created_at: Option<DateTime<Utc>>,
    #[arg(long)]
    github_repos: Option<u64>,
    /// Reference time; defaults to now.
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

#[derive(Args)]
struct RuleAddressArgs {
    #[arg(long, env = "ANONN_PROGRAM_ID")]
    program_id: Address,
    #[arg(long, env = "ANONN_RULE_AUTHORITY")]
    authority: Address,
    #[arg(long, env = "ANONN_RULE_ID")]
    rule_id: String,
}

#[derive(Args)]
struct ProofAddressArgs {
    #[arg(long, env = "ANONN_PROGRAM_ID")]
    program_id: Address,
    /// Rule address. Derived from `--authority` and `--rule-id` when omitted.
    #[arg(long)]
    rule: Option<Address>,
    #[arg(long, env = "ANONN_RULE_AUTHORITY")]
    authority: Option<Address>,
    #[arg(long, env = "ANONN_RULE_ID")]
    rule_id: Option<String>,
    #[arg(long)]
    user: Address,
    /// Epoch; defaults to the current epoch.
    #[arg(long)]
    epoch: Option<u64>,
    #[arg(long, env = "ANONN_EPOCH_SECONDS", default_value_t = DEFAULT_EPOCH_SECONDS)]
    period_secs: u64,
}

#[derive(Args)]
struct EpochArgs {
    #[arg(long, env = "ANONN_EPOCH_SECONDS", default_value_t = DEFAULT_EPOCH_SECONDS)]
    period_secs: u64,
    /// Timestamp (RFC 3339); defaults to now.
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

#[derive(Args)]
struct AuthUrlArgs {
    /// `twitter` or `github`.
    #[arg(long)]
    provider: Provider,
    #[arg(long)]
    client_id: String,
    #[arg(long, env = "ANONN_APP_ORIGIN", default_value = "http://localhost:5173")]
    app_origin: String,
    /// Also print the PKCE verifier, for exchanging the code by hand.
    #[arg(long)]
    show_verifier: bool,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Five bucket ordinals in canonical order, e.g. `4,4,5,0,1`.
    #[arg(long, value_delimiter = ',')]
    signals: Vec<u8>,
    /// Five threshold ordinals in canonical order.
    #[arg(long, value_delimiter = ',')]
    thresholds: Vec<u8>,
    #[arg(long)]
    tier1_min: u8,
    #[arg(long)]
    tier2_min: u8,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anonn_tools=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = match cli.command {
        Commands::Bucket(args) => bucket(args, Utc::now()),
        Commands::RuleAddress(args) => rule_address_cmd(args),
        Commands::ProofAddress(args) => proof_address_cmd(args, Utc::now()),
        Commands::Epoch(args) => epoch(args, Utc::now()),
        Commands::AuthUrl(args) => auth_url(args),
        Commands::Evaluate(args) => evaluate_cmd(args),
    }?;
    print_json(&output)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════════════════════

fn bucket(args: BucketArgs, now: DateTime<Utc>) -> Result<Value> {
    let now = args.now.unwrap_or(now);
    let raw = RawSignals {
        wallet_created_at: args.wallet_created_at,
        tx_count: args.tx_count,
        twitter_created_at: args.twitter_created_at,
        github_created_at: args.github_created_at,
        github_public_repos: args.github_repos,
    };
    let buckets = bucket_signals(&raw, now);
    let missing: Vec<&str> = buckets.missing().iter().map(|kind| kind.as_str()).collect();

    Ok(json!({
        "now": now,
        "buckets": buckets,
        "labels": bucket_labels(&buckets),
        "complete": missing.is_empty(),
        "missing": missing,
    }))
}

fn bucket_labels(buckets: &PartialUserSignals) -> Value {
    json!({
        "walletAge": buckets.wallet_age_bucket.map(describe_age_bucket),
        "txCount": buckets.tx_count_bucket.map(describe_count_bucket),
        "twitterAge": buckets.twitter_age_bucket.map(describe_age_bucket),
        "githubAge": buckets.github_age_bucket.map(describe_age_bucket),
        "githubRepos": buckets.github_repo_bucket.map(describe_count_bucket),
    })
}

fn rule_address_cmd(args: RuleAddressArgs) -> Result<Value> {
    let address = rule_address(&args.program_id, &args.authority, &args.rule_id)?;
    Ok(json!({
        "programId": args.program_id,
        "authority": args.authority,
        "ruleId": args.rule_id,
        "ruleAddress": address,
    }))
}

fn proof_address_cmd(args: ProofAddressArgs, now: DateTime<Utc>) -> Result<Value> {
    let rule = match (args.rule, args.authority, args.rule_id.as_deref()) {
        (Some(rule), _, _) => rule,
        (None, Some(authority), Some(rule_id)) => rule_address(&args.program_id, &authority, rule_id)?,
        _ => bail!("either --rule or both --authority and --rule-id are required"),
    };
    let epoch = args
        .epoch
        .unwrap_or_else(|| EpochConfig::new(args.period_secs).current_epoch(now));
    debug!(%rule, epoch, "Deriving proof address");

    let address = proof_address(&args.program_id, &rule, &args.user, epoch)?;
    Ok(json!({
        "ruleAddress": rule,
        "user": args.user,
        "epoch": epoch,
        "proofAddress": address,
    }))
}

fn epoch(args: EpochArgs, now: DateTime<Utc>) -> Result<Value> {
    let at = args.at.unwrap_or(now);
    let config = EpochConfig::new(args.period_secs);
    let epoch = config.current_epoch(at);
    let start_secs = i64::try_from(config.epoch_start(epoch)).context("epoch start out of range")?;
    let starts_at = Utc
        .timestamp_opt(start_secs, 0)
        .single()
        .context("epoch start out of range")?;

    Ok(json!({
        "epoch": epoch,
        "periodSecs": config.period_secs,
        "startsAt": starts_at,
    }))
}

fn auth_url(args: AuthUrlArgs) -> Result<Value> {
    let config = OAuthConfig::new(args.app_origin).with_client_id(args.provider, args.client_id);
    let request = build_authorization_request(&config, args.provider)?;

    let mut output = json!({
        "provider": args.provider.as_str(),
        "url": request.url.as_str(),
        "redirectUri": config.redirect_uri(args.provider),
        "state": request.session.state(),
    });
    if args.show_verifier {
        output["codeVerifier"] = json!(request.session.code_verifier());
    }
    Ok(output)
}

fn to_array(values: &[u8], what: &str) -> Result<[u8; SIGNAL_COUNT]> {
    values
        .try_into()
        .map_err(|_| anyhow::anyhow!("--{what} needs exactly {SIGNAL_COUNT} values, got {}", values.len()))
}

fn evaluate_cmd(args: EvaluateArgs) -> Result<Value> {
    let signals = UserSignals::from_array(to_array(&args.signals, "signals")?)?;
    let [wallet, tx, twitter, github, repos] = to_array(&args.thresholds, "thresholds")?;
    let thresholds = RuleThresholds {
        wallet_age_threshold: AgeBucket::try_from(wallet)?,
        tx_count_threshold: CountBucket::try_from(tx)?,
        twitter_age_threshold: AgeBucket::try_from(twitter)?,
        github_age_threshold: AgeBucket::try_from(github)?,
        github_repo_threshold: CountBucket::try_from(repos)?,
    };
    let rule = RuleDefinition::new("cli", thresholds, args.tier1_min, args.tier2_min);
    rule.validate()?;

    let evaluation = evaluate(&signals, &rule);
    Ok(json!({
        "conditionsMet": evaluation.conditions_met,
        "tier": evaluation.tier,
        "description": describe_tier(evaluation.conditions_met, rule.tier1_min, rule.tier2_min),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_748_736_000, 0).unwrap()
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_bucket_reports_missing_signals() {
        let args = BucketArgs {
            wallet_created_at: Some(now() - Duration::days(400)),
            tx_count: Some(250),
            twitter_created_at: None,
            github_created_at: None,
            github_repos: Some(0),
            now: None,
        };
        let output = bucket(args, now()).unwrap();
        assert_eq!(output["buckets"]["walletAgeBucket"], 4);
        assert_eq!(output["labels"]["txCount"], "> 200");
        assert_eq!(output["buckets"]["githubRepoBucket"], 0);
        assert_eq!(output["complete"], false);
        assert_eq!(output["missing"], json!(["twitter_age", "github_age"]));
    }

    #[test]
    fn test_proof_address_matches_derivation() {
        let program_id = Address::new([1u8; 32]);
        let authority = Address::new([2u8; 32]);
        let user = Address::new([3u8; 32]);
        let rule = rule_address(&program_id, &authority, "builders").unwrap();

        let args = ProofAddressArgs {
            program_id,
            rule: None,
            authority: Some(authority),
            rule_id: Some("builders".into()),
            user,
            epoch: None,
            period_secs: DEFAULT_EPOCH_SECONDS,
        };
        let output = proof_address_cmd(args, now()).unwrap();
        let expected = proof_address(&program_id, &rule, &user, 20_240).unwrap();
        assert_eq!(output["epoch"], 20_240);
        assert_eq!(output["proofAddress"], expected.to_string());
    }

    #[test]
    fn test_proof_address_needs_a_rule() {
        let args = ProofAddressArgs {
            program_id: Address::new([1u8; 32]),
            rule: None,
            authority: None,
            rule_id: Some("builders".into()),
            user: Address::new([3u8; 32]),
            epoch: Some(1),
            period_secs: DEFAULT_EPOCH_SECONDS,
        };
        assert!(proof_address_cmd(args, now()).is_err());
    }

    #[test]
    fn test_epoch_start() {
        let args = EpochArgs {
            period_secs: 3600,
            at: Some(now() + Duration::minutes(30)),
        };
        let output = epoch(args, now()).unwrap();
        assert_eq!(output["epoch"], 1_748_736_000u64 / 3600);
        assert_eq!(output["startsAt"], json!(now()));
    }

    #[test]
    fn test_auth_url_hides_verifier_by_default() {
        let args = AuthUrlArgs {
            provider: Provider::GitHub,
            client_id: "gh-client".into(),
            app_origin: "https://app.anonn.test".into(),
            show_verifier: false,
        };
        let output = auth_url(args).unwrap();
        let url = output["url"].as_str().unwrap();
        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("client_id=gh-client"));
        assert_eq!(
            output["redirectUri"],
            "https://app.anonn.test/oauth/callback/github"
        );
        assert!(output.get("codeVerifier").is_none());
    }

    #[test]
    fn test_evaluate_tiers() {
        let args = EvaluateArgs {
            signals: vec![4, 4, 5, 0, 1],
            thresholds: vec![3, 3, 4, 2, 1],
            tier1_min: 2,
            tier2_min: 4,
        };
        let output = evaluate_cmd(args).unwrap();
        assert_eq!(output["conditionsMet"], 4);
        assert_eq!(output["tier"], 2);
        assert_eq!(output["description"], "Tier 2 (4/4 conditions met)");
    }

    #[test]
    fn test_evaluate_describes_shortfall() {
        let args = EvaluateArgs {
            signals: vec![1, 0, 5, 0, 0],
            thresholds: vec![3, 3, 4, 2, 1],
            tier1_min: 2,
            tier2_min: 4,
        };
        let output = evaluate_cmd(args).unwrap();
        assert_eq!(output["conditionsMet"], 1);
        assert_eq!(output["tier"], 0);
        assert_eq!(output["description"], "Tier 0 (1 conditions met, need 2 for Tier 1)");
    }

    #[test]
    fn test_evaluate_rejects_out_of_range_bucket() {
        let args = EvaluateArgs {
            signals: vec![4, 9, 5, 0, 1],
            thresholds: vec![3, 3, 4, 2, 1],
            tier1_min: 2,
            tier2_min: 4,
        };
        assert!(evaluate_cmd(args).is_err());
    }
}
