//! Install instructions shown when the CLI is missing.

const INSTALL_DOCS_URL: &str = "https://docs.microsoft.com/cli/azure/install-azure-cli";

/// Operator-facing instructions for installing the CLI on `os`
/// (a value of [`std::env::consts::OS`]).
pub fn install_instructions(cli: &str, os: &str) -> String {
    let platform = match os {
        "windows" => {
            "Download this link to install on Windows:\n  https://aka.ms/installazurecliwindows"
        },
        "macos" => "Run this script to install Azure CLI on macOS:\n  brew update && brew install azure-cli",
        _ => "Run this script to install Azure CLI on Linux:\n  curl -L https://aka.ms/InstallAzureCli | bash",
    };
    format!(
        "Command `{cli}` not found. Please install Azure CLI first!\n\n{platform}\n\n(How to install the Azure CLI: {INSTALL_DOCS_URL})"
    )
}

/// Print [`install_instructions`] for the current platform to stderr.
pub fn print_install_instructions(cli: &str) {
    eprintln!("{}", install_instructions(cli, std::env::consts::OS));
}
