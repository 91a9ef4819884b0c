use std::error::Error;
use std::path::PathBuf;
use clap::Parser;
use rfdk_x509_cli::{passphrase_from_env, read_certificate, write_file, PASSPHRASE_ENV, SIGNER_PASSPHRASE_ENV};

#[derive(Parser, Debug)]
#[command(name = "mk_pkcs12")]
#[command(about = "Bundle a certificate, its chain and its private key into a PKCS #12 file.", long_about = None)]
struct Cli {
    #[arg(
        long,
        value_name = "DIR",
        default_value = ".",
        help = "Directory holding <name>.crt, <name>.key and optional <name>.chain.pem."
    )]
    dir: PathBuf,

    #[arg(long, short = 'n', value_name = "NAME", required = true, help = "Base name of the certificate files.")]
    name: String,

    #[arg(
        long,
        value_name = "ENV_VAR",
        default_value = SIGNER_PASSPHRASE_ENV,
        help = "Environment variable holding the passphrase of the existing private key."
    )]
    key_passphrase_env: String,

    #[arg(
        long,
        value_name = "ENV_VAR",
        default_value = PASSPHRASE_ENV,
        help = "Environment variable holding the passphrase for the PKCS #12 bundle."
    )]
    passphrase_env: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    let key_passphrase = passphrase_from_env(&args.key_passphrase_env)?;
    let passphrase = passphrase_from_env(&args.passphrase_env)?;
    let certificate = read_certificate(&args.dir, &args.name, key_passphrase)?;

    let pfx = certificate.to_pkcs12(&passphrase)?;
    let path = write_file(args.dir.join(format!("{}.pfx", &args.name)), &pfx)?;
    println!("{}", path.display());
    Ok(())
}
