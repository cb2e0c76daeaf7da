/// Return this error from a workload function to indicate that the virtual user is bailing.
///
/// This should be used when a VU encounters an error that is fatal to that VU but not to the
/// scenario. For example, if the VU's session against the target can't be re-established then the
/// VU may bail and the scheduler will start a fresh VU in its place if the executor still needs one.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct VuBailError {
    msg: String,
}

impl VuBailError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for VuBailError {
    fn default() -> Self {
        Self {
            msg: "Virtual user is bailing".to_string(),
        }
    }
}
