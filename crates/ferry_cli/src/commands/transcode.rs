//! Preview the conversion of one legacy body.

use std::path::Path;

use ferry_core::{FerryConfig, IdentityMap, Transcoder};
use miette::{IntoDiagnostic, Result, WrapErr};

use crate::output::Output;

pub async fn run(config: &FerryConfig, file: &Path, strict: bool, output: &Output) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("reading {}", file.display()))?;

    let options = config.import.transcode_options();
    let transcoder = Transcoder::new(&options).strict(strict || options.strict);
    output.info("Passes:", &transcoder.pass_names().join(" → "));

    // Mentions resolve against whatever has been imported so far.
    let mentioned = transcoder.mentioned_posts(&raw);
    let table = if mentioned.is_empty() {
        Default::default()
    } else {
        let (_db, identity) = super::open_identity(config).await?;
        identity.locate_posts(&mentioned).await?
    };
    if mentioned.len() > table.len() {
        output.warning(&format!(
            "{} of {} mentioned posts are not imported yet and stay as text",
            mentioned.len() - table.len(),
            mentioned.len()
        ));
    }

    let body = transcoder.transcode(&raw, &table, None)?;
    output.markup(&body.text);
    if let Some(number) = body.reply_to_post_number {
        output.kv("replies to post", &number.to_string());
    }
    Ok(())
}
