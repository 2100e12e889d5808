use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::marker::PhantomData;

use crate::error::{EngineError, EngineResult};

/// Tags a label vocabulary so encoders for different label spaces are different types.
pub trait LabelSpace {
    const NAME: &'static str;
}

#[derive(Debug, Clone, Copy)]
pub struct WinningFormation;

#[derive(Debug, Clone, Copy)]
pub struct LosingFormation;

#[derive(Debug, Clone, Copy)]
pub struct Tactic;

impl LabelSpace for WinningFormation {
    const NAME: &'static str = "winning formation";
}

impl LabelSpace for LosingFormation {
    const NAME: &'static str = "losing formation";
}

impl LabelSpace for Tactic {
    const NAME: &'static str = "tactic";
}

/// Sorted-vocabulary label encoder. Codes are positions in the sorted list of distinct
/// labels seen at fit time, so the same labels always get the same codes.
#[derive(Clone)]
pub struct LabelEncoder<S: LabelSpace> {
    classes: Vec<String>,
    index: HashMap<String, usize>,
    _space: PhantomData<S>,
}

impl<S: LabelSpace> fmt::Debug for LabelEncoder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelEncoder")
            .field("space", &S::NAME)
            .field("classes", &self.classes)
            .finish()
    }
}

impl<S: LabelSpace> LabelEncoder<S> {
    pub fn fit<I, T>(labels: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let classes: Vec<String> = labels
            .into_iter()
            .map(|l| l.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self {
            classes,
            index,
            _space: PhantomData,
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn encode(&self, label: &str) -> EngineResult<usize> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| EngineError::UnknownLabel {
                space: S::NAME,
                label: label.to_string(),
            })
    }

    pub fn encode_all<T: AsRef<str>>(&self, labels: &[T]) -> EngineResult<Vec<usize>> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    pub fn decode(&self, code: usize) -> EngineResult<&str> {
        self.classes
            .get(code)
            .map(String::as_str)
            .ok_or(EngineError::InvalidCode {
                space: S::NAME,
                code,
                size: self.classes.len(),
            })
    }

    pub fn decode_all(&self, codes: &[usize]) -> EngineResult<Vec<String>> {
        codes
            .iter()
            .map(|&c| self.decode(c).map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{LabelEncoder, LosingFormation, WinningFormation};
    use crate::error::EngineError;

    #[test]
    fn duplicate_labels_share_one_code() {
        let enc = LabelEncoder::<WinningFormation>::fit(["4-4-2", "4-3-3", "4-4-2"]);
        assert_eq!(enc.len(), 2);
        let code = enc.encode("4-4-2").unwrap();
        assert_ne!(code, enc.encode("4-3-3").unwrap());
        assert_eq!(enc.decode(code).unwrap(), "4-4-2");
    }

    #[test]
    fn codes_follow_sorted_order() {
        let enc = LabelEncoder::<LosingFormation>::fit(["5-3-2", "3-5-2", "4-4-2"]);
        assert_eq!(enc.classes(), &["3-5-2", "4-4-2", "5-3-2"]);
        assert_eq!(enc.encode("3-5-2").unwrap(), 0);
    }

    #[test]
    fn round_trip_holds_for_every_label() {
        let enc = LabelEncoder::<WinningFormation>::fit(["4-2-3-1", "3-4-3", "4-1-4-1", "4-4-2"]);
        for label in enc.classes() {
            let code = enc.encode(label).unwrap();
            assert_eq!(enc.decode(code).unwrap(), label);
        }
    }

    #[test]
    fn unknown_label_and_bad_code_fail() {
        let enc = LabelEncoder::<LosingFormation>::fit(["4-4-2"]);
        assert!(matches!(
            enc.encode("2-3-5"),
            Err(EngineError::UnknownLabel { space: "losing formation", .. })
        ));
        assert!(matches!(
            enc.decode(1),
            Err(EngineError::InvalidCode { code: 1, size: 1, .. })
        ));
    }
}
