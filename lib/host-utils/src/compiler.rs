// SPDX-License-Identifier: MIT
use std::io::Write;
use std::process::{Command, Stdio};

use alloy_primitives::{keccak256, Bytes, B256};
use anyhow::{bail, Context, Result};
use tracing::debug;

/// Creation bytecode of a compiled contract.
#[derive(Debug, Clone)]
pub struct CompiledContract {
    pub bytecode: Bytes,
    pub code_hash: B256,
}

impl CompiledContract {
    /// Init code followed by ABI-encoded constructor arguments.
    pub fn with_constructor_args(&self, args: &[u8]) -> Bytes {
        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(args);
        Bytes::from(code)
    }
}

/// Compile `source` with `solc` and return the creation bytecode of `name`.
///
/// The source is piped over stdin, so no file is written. Expects `solc`
/// 0.8.13 or later in PATH (e.g. via `solc-select` or `svm`). Targets paris
/// so the bytecode runs on nodes without PUSH0.
pub fn compile_contract(source: &str, name: &str) -> Result<CompiledContract> {
    let mut child = Command::new("solc")
        .arg("--evm-version")
        .arg("paris")
        .arg("--combined-json")
        .arg("abi,bin")
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context(
            "failed to execute solc. Is solc installed? Try: pip install solc-select && \
             solc-select install 0.8.13 && solc-select use 0.8.13",
        )?;

    child
        .stdin
        .take()
        .context("solc stdin unavailable")?
        .write_all(source.as_bytes())
        .context("failed to write source to solc")?;

    let output = child.wait_with_output().context("solc did not finish")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("solc compilation failed:\n{}", stderr);
    }

    let stdout = String::from_utf8(output.stdout).context("solc output is not valid UTF-8")?;
    let compiled = extract_contract(&stdout, name)?;
    debug!(
        contract = name,
        size = compiled.bytecode.len(),
        code_hash = %compiled.code_hash,
        "Compiled contract"
    );
    Ok(compiled)
}

/// Pull `name` out of solc `--combined-json` output. Keys are
/// `"<source>:<Contract>"`.
pub fn extract_contract(combined_json: &str, name: &str) -> Result<CompiledContract> {
    let json: serde_json::Value =
        serde_json::from_str(combined_json).context("failed to parse solc JSON output")?;

    let contracts = json
        .get("contracts")
        .context("solc output missing 'contracts' field")?
        .as_object()
        .context("solc 'contracts' is not an object")?;

    let suffix = format!(":{name}");
    let contract = contracts
        .iter()
        .find(|(key, _)| key.ends_with(&suffix))
        .map(|(_, value)| value)
        .with_context(|| {
            let available: Vec<&String> = contracts.keys().collect();
            format!(
                "Contract '{name}' not found in solc output. Available contracts: {available:?}"
            )
        })?;

    let bin_hex = contract
        .get("bin")
        .and_then(|v| v.as_str())
        .with_context(|| format!("solc output missing 'bin' for {name}"))?;

    if bin_hex.is_empty() {
        bail!("{name} has empty bytecode (is it abstract or an interface?)");
    }

    let bytecode = hex::decode(bin_hex).context("failed to decode hex bytecode from solc")?;
    let code_hash = keccak256(&bytecode);

    Ok(CompiledContract {
        bytecode: Bytes::from(bytecode),
        code_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMBINED: &str = r#"{
        "contracts": {
            "<stdin>:IVault": { "abi": [], "bin": "" },
            "<stdin>:VaultExploit": { "abi": [], "bin": "6080604052348015600f57600080fd5b50" }
        },
        "version": "0.8.13+commit.abaa5c0e.Linux.g++"
    }"#;

    #[test]
    fn test_extract_named_contract() {
        let compiled = extract_contract(COMBINED, "VaultExploit").unwrap();
        assert_eq!(compiled.bytecode.len(), 17);
        assert_eq!(compiled.code_hash, keccak256(&compiled.bytecode));
    }

    #[test]
    fn test_interface_has_no_bytecode() {
        let err = extract_contract(COMBINED, "IVault").unwrap_err();
        assert!(err.to_string().contains("empty bytecode"));
    }

    #[test]
    fn test_missing_contract_lists_available() {
        let err = extract_contract(COMBINED, "AttackContract").unwrap_err();
        assert!(err.to_string().contains("VaultExploit"));
    }

    #[test]
    fn test_suffix_match_is_exact() {
        // "Exploit" must not match "<stdin>:VaultExploit".
        assert!(extract_contract(COMBINED, "Exploit").is_err());
    }

    #[test]
    fn test_constructor_args_are_appended() {
        let compiled = extract_contract(COMBINED, "VaultExploit").unwrap();
        let code = compiled.with_constructor_args(&[0u8; 32]);
        assert_eq!(code.len(), 17 + 32);
        assert_eq!(&code[..17], compiled.bytecode.as_ref());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(extract_contract("not json", "VaultExploit").is_err());
    }
}
