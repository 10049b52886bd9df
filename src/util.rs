#[macro_export]
macro_rules! run {
	($n:expr $(, $arr:expr)* $(,)?) => {{
		let out = std::process::Command::new($n)
		.args([$($arr,)*])
		.output()?;
		if out.status.success() {
			Ok(out.stdout)
		} else {
			use color_eyre::{eyre::eyre, SectionExt, Help};
			let stdout = String::from_utf8_lossy(&out.stdout);
			let stderr = String::from_utf8_lossy(&out.stderr);
			Err(eyre!("Command returned non-zero code"))
				.with_section(move || stdout.trim().to_string().header("Stdout:"))
				.with_section(move || stderr.trim().to_string().header("Stdout:"))
		}
	}};
}

/// A fresh per-build image identifier. Generated once per [`crate::model::ResolvedConfig`]
/// and threaded through artifact naming and `/etc/machine-id`-adjacent bookkeeping.
#[must_use]
pub fn new_image_uuid() -> uuid::Uuid {
	uuid::Uuid::new_v4()
}
