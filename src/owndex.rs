//! Input files of the tools: the JSON form of one dex model, or a list of
//! them for multidex applications.

use crate::prelude::*;
use clap::ArgMatches;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OwnDex {
    MultiDex(Vec<Dex>),
    Dex(Dex),
}

impl OwnDex {
    pub fn open<P: AsRef<Path>>(path: P) -> DvResult<Self> {
        let file = File::open(path.as_ref())?;
        let own: Self = serde_json::from_reader(BufReader::new(file))?;
        log::debug!(
            "{} dex model(s) loaded from {:?}",
            own.borrow_dexs().len(),
            path.as_ref()
        );
        Ok(own)
    }

    #[must_use]
    pub fn borrow_dexs(&self) -> Vec<&Dex> {
        match self {
            Self::Dex(dex) => vec![dex],
            Self::MultiDex(dexs) => dexs.iter().collect(),
        }
    }
}

/// Loads the `--system` and `--input` files of a command and registers
/// their classes in a new repository.
pub fn open_repo(args: &ArgMatches) -> DvResult<(Repo, OwnDex)> {
    let mut repo = Repo::new();
    let sys = args
        .try_get_one::<String>("system")
        .ok()
        .flatten()
        .map(OwnDex::open)
        .transpose()?;
    if let Some(sys) = &sys {
        for dex in sys.borrow_dexs() {
            repo.register_dex(dex, true)?;
        }
    }
    let input_fname = args
        .get_one::<String>("input")
        .ok_or_else(|| DvError::BadArguments("--input needed".to_string()))?;
    let input = OwnDex::open(input_fname)?;
    for dex in input.borrow_dexs() {
        repo.register_dex(dex, false)?;
    }
    repo.close_hierarchy()?;
    log::info!(
        "repository: {} classes, {} methods, {} fields",
        repo.nb_classes(),
        repo.nb_methods(),
        repo.nb_fields()
    );
    Ok((repo, input))
}

/// Finds the dex defining a class among the input dexes, with the method
/// named on the command line.
pub fn find_input_method<'d>(
    input: &'d OwnDex,
    class: &str,
    method: &str,
) -> DvResult<(
    &'d Dex,
    &'d dv_dex::classes::ClassDefItem,
    &'d dv_dex::methods::EncodedMethod,
)> {
    let mut last_err = None;
    for dex in input.borrow_dexs() {
        match find_method(dex, class, method) {
            Ok((class_def, encoded)) => return Ok((dex, class_def, encoded)),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.map_or_else(
        || DvError::BadArguments("empty input".to_string()),
        DvError::from,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_multi() {
        let single: OwnDex = serde_json::from_str(r#"{"strings": ["LFoo;"]}"#).unwrap();
        assert_eq!(single.borrow_dexs().len(), 1);
        let multi: OwnDex = serde_json::from_str("[{}, {}]").unwrap();
        assert_eq!(multi.borrow_dexs().len(), 2);
    }
}
