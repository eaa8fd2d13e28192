//! Print the OpenAPI document as JSON.

use std::io::{self, Write};

use sensornet::doc::ApiDoc;
use utoipa::OpenApi;

fn main() -> io::Result<()> {
    let document = ApiDoc::openapi()
        .to_pretty_json()
        .map_err(|error| io::Error::other(format!("serialise OpenAPI document: {error}")))?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{document}")
}
