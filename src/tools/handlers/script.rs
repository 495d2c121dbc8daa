// Script execution: delegates to the sandbox and maps its
// `(output, status)` pair into the tool envelope.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::sandbox::{ScriptSandbox, STATUS_DONE};
use crate::tools::handlers::Handled;
use crate::tools::types::required_str;

pub(crate) async fn exec_script(sandbox: &ScriptSandbox, args: &Value) -> Result<Handled> {
    let code = required_str(args, "code")?;
    let (output, status) = sandbox.run(code).await;
    if status != STATUS_DONE {
        bail!(status);
    }
    Ok((output, None))
}
