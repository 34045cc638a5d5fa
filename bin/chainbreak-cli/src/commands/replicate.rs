// SPDX-License-Identifier: MIT
//! Replication without sending anything: evaluate a formula over
//! observables given as hex, or read live from an RPC endpoint.

use alloy_primitives::Address;
use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use tracing::info;

use chain_types::observable::{Observable, ObservableKind};
use host_utils::observables::ObservableReader;
use host_utils::provider::validate_rpc_url;
use host_utils::rpc::RpcClient;
use replicator::vault::{magic_password_formula, unlock_password};
use replicator::{replicate, Formula};

use crate::commands::print_json;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Magic Vault: observables are passphrase, nonce, key1 block hash,
    /// key2 block hash.
    VaultMagic,
}

#[derive(Args, Debug)]
pub struct ReplicateArgs {
    /// Formula text, e.g. "load:0,load:2,add,hash,head:8".
    #[arg(long, conflicts_with = "preset", required_unless_present = "preset")]
    pub formula: Option<String>,

    /// Built-in formula.
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Observable value as hex, in load order. Repeat for each input.
    #[arg(long = "observable", required_unless_present = "reads")]
    pub observables: Vec<String>,

    /// Observable to read from chain state at the current head, in load
    /// order: blockhash:N, timestamp:N, slot:ADDRESS:SLOT or
    /// counter:ADDRESS:SELECTOR.
    #[arg(long = "read", conflicts_with = "observables", requires = "rpc_url")]
    pub reads: Vec<ObservableKind>,

    /// Ethereum JSON-RPC endpoint URL for --read.
    #[arg(long)]
    pub rpc_url: Option<String>,

    /// Vault owner. Prints the full 16-byte unlock password built from an
    /// 8-byte result.
    #[arg(long)]
    pub owner: Option<Address>,
}

pub fn parse_observable(raw: &str) -> Result<Vec<u8>> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(digits).with_context(|| format!("invalid observable hex: {raw}"))
}

fn resolve_formula(args: &ReplicateArgs) -> Result<Formula> {
    match (&args.formula, args.preset) {
        (Some(text), _) => text.parse().context("failed to parse --formula"),
        (None, Some(Preset::VaultMagic)) => Ok(magic_password_formula()),
        (None, None) => bail!("provide --formula or --preset"),
    }
}

async fn read_observables(args: &ReplicateArgs) -> Result<Vec<Observable>> {
    let Some(rpc_url) = &args.rpc_url else {
        bail!("--read needs --rpc-url");
    };
    let client = RpcClient::new(validate_rpc_url(rpc_url)?.as_str());
    let reader = ObservableReader::at_head(&client).await?;
    info!(
        head = reader.head(),
        reads = args.reads.len(),
        "Reading observables"
    );

    let mut values = Vec::with_capacity(args.reads.len());
    for kind in &args.reads {
        values.push(reader.read(*kind).await?);
    }
    Ok(values)
}

/// Evaluate the formula and, when an owner is given, the unlock password.
fn evaluate(
    args: &ReplicateArgs,
    observables: &[Vec<u8>],
) -> Result<(Vec<u8>, Option<[u8; 16]>)> {
    let formula = resolve_formula(args)?;
    info!(
        steps = formula.steps().len(),
        needed = formula.arity(),
        inputs = observables.len(),
        "Replicating"
    );

    let output = replicate(observables, &formula)?;
    let password = match args.owner {
        Some(owner) => {
            let magic: [u8; 8] = output.as_slice().try_into().ok().with_context(|| {
                format!("--owner needs an 8-byte result, got {} bytes", output.len())
            })?;
            Some(unlock_password(owner, magic))
        }
        None => None,
    };
    Ok((output, password))
}

fn json_summary(
    output: &[u8],
    password: Option<[u8; 16]>,
    read: &[Observable],
) -> serde_json::Value {
    serde_json::json!({
        "output": format!("0x{}", hex::encode(output)),
        "password": password.map(|p| format!("0x{}", hex::encode(p))),
        "observables": read,
    })
}

pub async fn run(args: ReplicateArgs, json_output: bool) -> Result<()> {
    let (observables, read) = if args.reads.is_empty() {
        let parsed = args
            .observables
            .iter()
            .map(|s| parse_observable(s))
            .collect::<Result<Vec<_>>>()?;
        (parsed, Vec::new())
    } else {
        let read = read_observables(&args).await?;
        let values = read.iter().map(|o| o.as_bytes().to_vec()).collect();
        (values, read)
    };
    let (output, password) = evaluate(&args, &observables)?;

    if json_output {
        return print_json(&json_summary(&output, password, &read));
    }
    println!("0x{}", hex::encode(&output));
    if let Some(password) = password {
        println!("Unlock password: 0x{}", hex::encode(password));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use replicator::ReplicateError;

    fn args(formula: Option<&str>, preset: Option<Preset>, observables: &[&str]) -> ReplicateArgs {
        ReplicateArgs {
            formula: formula.map(str::to_string),
            preset,
            observables: observables.iter().map(|s| s.to_string()).collect(),
            reads: Vec::new(),
            rpc_url: None,
            owner: None,
        }
    }

    fn eval(a: &ReplicateArgs) -> Result<(Vec<u8>, Option<[u8; 16]>)> {
        let inputs = a
            .observables
            .iter()
            .map(|s| parse_observable(s))
            .collect::<Result<Vec<_>>>()?;
        evaluate(a, &inputs)
    }

    fn word(last: u8) -> String {
        format!("0x{}{:02x}", "00".repeat(31), last)
    }

    #[test]
    fn test_parse_observable_accepts_prefix() {
        assert_eq!(parse_observable("0xdead").unwrap(), vec![0xde, 0xad]);
        assert_eq!(parse_observable("beef").unwrap(), vec![0xbe, 0xef]);
        assert!(parse_observable("0xzz").is_err());
    }

    #[test]
    fn test_formula_from_text() {
        let a = args(
            Some("load:0,load:2,add,hash,load:1,load:2,word:1,add,add,hash,xor,head:8,rotr:2"),
            None,
            &[&word(1), &word(2), &word(3)],
        );
        let (output, password) = eval(&a).unwrap();
        assert_eq!(output, hex!("7c437c678ed8d2bd"));
        assert!(password.is_none());
    }

    #[test]
    fn test_vault_preset_with_owner() {
        let mut a = args(
            None,
            Some(Preset::VaultMagic),
            &[
                "5f1a8e8a85c412607b453d7439da843b6a3027830015596e78722edcf541ef7e",
                &word(0x2a),
                "a29bcce5697f3febdcd150ceb73f558b35d53dcadc485f0ba928f94f245c5de0",
                "dead2a52c2d7517e2b7d6a4092bb9061496906c018fd4c1d5cce5a2dec96da2c",
            ],
        );
        a.owner = Some(Address::from(hex!("04FBB5958ab998Ab5C82f458bE1D3A74541a045c")));
        let (output, password) = eval(&a).unwrap();
        assert_eq!(output, hex!("5461b3c9dffd5461"));
        assert_eq!(password, Some(hex!("be1d3a74541a045c5461b3c9dffd5461")));
    }

    #[test]
    fn test_short_observable_is_malformed() {
        let short = format!("0x{}", "00".repeat(31));
        let a = args(Some("load:0,hash"), None, &[&short]);
        let err = eval(&a).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ReplicateError>(),
            Some(&ReplicateError::MalformedInput {
                index: 0,
                expected: 32,
                actual: 31
            })
        );
    }

    #[test]
    fn test_json_summary_lists_read_observables() {
        let kind = ObservableKind::BlockHash { number: 17 };
        let read = [Observable::word(kind, alloy_primitives::B256::repeat_byte(0xab))];
        let value = json_summary(&hex!("5461b3c9dffd5461"), None, &read);

        assert_eq!(value["output"], "0x5461b3c9dffd5461");
        assert!(value["password"].is_null());
        assert_eq!(value["observables"][0]["kind"]["block_hash"]["number"], 17);
        assert_eq!(
            value["observables"][0]["value"],
            format!("0x{}", "ab".repeat(32))
        );
    }

    #[test]
    fn test_owner_requires_eight_bytes() {
        let mut a = args(Some("load:0,hash"), None, &[&word(1)]);
        a.owner = Some(Address::ZERO);
        assert!(eval(&a).is_err());
    }
}
