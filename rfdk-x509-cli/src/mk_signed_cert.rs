use std::error::Error;
use std::path::PathBuf;
use clap::Parser;
use rfdk_x509::{Certificate, DEFAULT_VALID_DAYS};
use rfdk_x509_cli::{
    passphrase_from_env,
    read_certificate,
    subject,
    write_certificate,
    PASSPHRASE_ENV,
    SIGNER_PASSPHRASE_ENV,
};

#[derive(Parser, Debug)]
#[command(name = "mk_signed_cert")]
#[command(about = "Generate a new RSA key pair and a certificate signed by an existing CA.", long_about = None)]
struct Cli {
    #[arg(
        long,
        short = 'c',
        value_name = "COMMON_NAME",
        required = true,
        help = "The Common Name of the subject."
    )]
    common_name: String,

    #[arg(long, short = 'o', value_name = "ORGANIZATION", help = "The Organization of the subject.")]
    organization: Option<String>,

    #[arg(long, short = 'u', value_name = "UNIT", help = "The Organizational Unit of the subject.")]
    unit: Option<String>,

    #[arg(
        long,
        short = 'd',
        value_name = "DAYS_VALID",
        default_value_t = DEFAULT_VALID_DAYS,
        help = "Number of days the certificate should be valid for."
    )]
    days: u32,

    #[arg(
        long,
        value_name = "DIR",
        required = true,
        help = "Directory holding the signer's <name>.crt, <name>.key and optional <name>.chain.pem."
    )]
    signer_dir: PathBuf,

    #[arg(long, value_name = "NAME", default_value = "ca", help = "Base name of the signer's files.")]
    signer_name: String,

    #[arg(
        long,
        value_name = "ENV_VAR",
        default_value = SIGNER_PASSPHRASE_ENV,
        help = "Environment variable holding the passphrase of the signer's private key."
    )]
    signer_passphrase_env: String,

    #[arg(
        long,
        value_name = "ENV_VAR",
        default_value = PASSPHRASE_ENV,
        help = "Environment variable holding the passphrase for the new private key."
    )]
    passphrase_env: String,

    #[arg(long, value_name = "DIR", default_value = ".", help = "Directory to write the new files to.")]
    out_dir: PathBuf,

    #[arg(long, short = 'n', value_name = "NAME", required = true, help = "Base name of the output files.")]
    name: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    let passphrase = passphrase_from_env(&args.passphrase_env)?;
    let signer_passphrase = passphrase_from_env(&args.signer_passphrase_env)?;
    let signer = read_certificate(&args.signer_dir, &args.signer_name, signer_passphrase)?;
    let dn = subject(args.common_name, args.organization, args.unit);

    let certificate = Certificate::generate_signed(&dn, &passphrase, args.days, &signer)?;
    for path in write_certificate(&args.out_dir, &args.name, &certificate)? {
        println!("{}", path.display());
    }
    Ok(())
}
