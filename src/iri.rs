//! IRI parsing.
//!
//! An IRI is a slash-separated logical key. Its first segment routes the
//! resource to a project, its second segment selects the resource kind
//! (`blob`, `image`, `meta` or the `*` wildcard used by iteration).

use std::fmt::{self, Display};

use crate::error::IriErrorKind;

/// The kind of content a resource stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// An opaque byte payload
    Blob,
    /// An image payload in the codec's native memory-mappable format
    Image,
    /// A NUL-terminated textual payload
    Meta,
    /// The `*` wildcard; accepted by IRI parsing, meaningless for put/get
    Wild,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Blob => "blob",
            Self::Image => "image",
            Self::Meta => "meta",
            Self::Wild => "*",
        };

        write!(f, "{kind}")
    }
}

/// The parsed form of an IRI: the verbatim key plus its routing components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Iri {
    /// The IRI exactly as the caller supplied it
    pub(crate) iri: String,
    /// The first segment
    pub(crate) project: String,
    /// The kind selected by the second segment
    pub(crate) kind: ResourceKind,
}

impl Iri {
    /// Splits an IRI into project, type and remainder and maps the type
    /// segment to a [`ResourceKind`].
    ///
    /// Empty segments are skipped, so `/tests/blob/rose` and
    /// `tests/blob/rose` route identically.
    ///
    /// # Errors
    ///
    /// * [`IriErrorKind::MissingProject`] - If the IRI has no first segment
    /// * [`IriErrorKind::MissingType`] - If the IRI has no second segment
    /// * [`IriErrorKind::UnknownResourceType`] - If the type segment is not recognized
    pub(crate) fn parse(iri: &str) -> Result<Self, IriErrorKind> {
        let mut segments = iri.split('/').filter(|segment| !segment.is_empty());

        let project = segments
            .next()
            .ok_or_else(|| IriErrorKind::MissingProject(iri.to_string()))?;
        let type_segment = segments
            .next()
            .ok_or_else(|| IriErrorKind::MissingType(iri.to_string()))?;

        let kind = if type_segment.eq_ignore_ascii_case("blob") {
            ResourceKind::Blob
        } else if type_segment.eq_ignore_ascii_case("image") {
            ResourceKind::Image
        } else if type_segment.eq_ignore_ascii_case("meta") {
            ResourceKind::Meta
        } else if type_segment == "*" {
            ResourceKind::Wild
        } else {
            return Err(IriErrorKind::UnknownResourceType(type_segment.to_string()));
        };

        Ok(Self {
            iri: iri.to_string(),
            project: project.to_string(),
            kind,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("tests/blob/rose", ResourceKind::Blob)]
    #[case("tests/image/rose", ResourceKind::Image)]
    #[case("tests/meta/rose", ResourceKind::Meta)]
    #[case("tests/IMAGE/rose", ResourceKind::Image)]
    #[case("tests/*", ResourceKind::Wild)]
    #[case("/tests/blob/rose", ResourceKind::Blob)]
    fn test_parse_iri_kind_passes(#[case] iri: &str, #[case] kind: ResourceKind) {
        let iri = Iri::parse(iri).unwrap();

        assert_eq!(iri.kind, kind);
        assert_eq!(iri.project, "tests");
    }

    #[rstest]
    #[case("")]
    #[case("/")]
    #[case("tests")]
    #[case("tests/")]
    fn test_parse_iri_too_few_segments_fails(#[case] iri: &str) {
        assert!(Iri::parse(iri).is_err(), "IRI {iri:?} parsed");
    }

    #[test]
    fn test_parse_iri_unknown_type_fails() {
        let err = Iri::parse("tests/video/rose").unwrap_err();

        assert!(
            matches!(err, IriErrorKind::UnknownResourceType(ref t) if t == "video"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_iri_is_kept_verbatim() {
        let iri = Iri::parse("tests/blob/rose/of/sharon").unwrap();

        assert_eq!(iri.iri, "tests/blob/rose/of/sharon");
    }
}
