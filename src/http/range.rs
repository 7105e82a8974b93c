/// Inclusive byte span of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes in the span.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for a resource of `total` bytes.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Interpretation of a `Range` header against a resource length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    Satisfiable(ByteRange),
    /// Well-formed but outside the resource; answered with 416
    Unsatisfiable,
    /// Malformed or multi-range; the full resource is sent instead
    Ignored,
}

/// Parses a single `bytes=<start>-<end>` range. Either bound may be omitted:
/// `bytes=N-` runs to the end, `bytes=-N` selects the last N bytes. The end
/// is clamped to the resource length.
pub fn parse_range(header: &str, total: u64) -> RangeRequest {
    let header = header.trim();
    let Some(spec) = header
        .get(..6)
        .filter(|unit| unit.eq_ignore_ascii_case("bytes="))
        .map(|_| &header[6..])
    else {
        return RangeRequest::Ignored;
    };

    if spec.contains(',') {
        return RangeRequest::Ignored;
    }
    let Some((first, last)) = spec.split_once('-') else {
        return RangeRequest::Ignored;
    };
    let (first, last) = (first.trim(), last.trim());

    let parse = |s: &str| s.parse::<u64>().ok();

    match (first.is_empty(), last.is_empty()) {
        (true, true) => RangeRequest::Ignored,
        (true, false) => match parse(last) {
            Some(0) => RangeRequest::Unsatisfiable,
            Some(_) if total == 0 => RangeRequest::Unsatisfiable,
            Some(suffix) => RangeRequest::Satisfiable(ByteRange {
                start: total.saturating_sub(suffix),
                end: total - 1,
            }),
            None => RangeRequest::Ignored,
        },
        (false, true) => match parse(first) {
            Some(start) if start >= total => RangeRequest::Unsatisfiable,
            Some(start) => RangeRequest::Satisfiable(ByteRange {
                start,
                end: total - 1,
            }),
            None => RangeRequest::Ignored,
        },
        (false, false) => match (parse(first), parse(last)) {
            (Some(start), Some(end)) if end < start => RangeRequest::Ignored,
            (Some(start), Some(_)) if start >= total => RangeRequest::Unsatisfiable,
            (Some(start), Some(end)) => RangeRequest::Satisfiable(ByteRange {
                start,
                end: end.min(total - 1),
            }),
            _ => RangeRequest::Ignored,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_range() {
        let range = parse_range("bytes=0-99", 1000);
        assert_eq!(range, RangeRequest::Satisfiable(ByteRange { start: 0, end: 99 }));
        if let RangeRequest::Satisfiable(r) = range {
            assert_eq!(r.len(), 100);
            assert_eq!(r.content_range(1000), "bytes 0-99/1000");
        }
    }

    #[test]
    fn open_and_suffix_ranges() {
        assert_eq!(
            parse_range("bytes=900-", 1000),
            RangeRequest::Satisfiable(ByteRange { start: 900, end: 999 })
        );
        assert_eq!(
            parse_range("bytes=-100", 1000),
            RangeRequest::Satisfiable(ByteRange { start: 900, end: 999 })
        );
        assert_eq!(
            parse_range("bytes=-5000", 1000),
            RangeRequest::Satisfiable(ByteRange { start: 0, end: 999 })
        );
    }

    #[test]
    fn end_is_clamped() {
        assert_eq!(
            parse_range("bytes=500-5000", 1000),
            RangeRequest::Satisfiable(ByteRange { start: 500, end: 999 })
        );
    }

    #[test]
    fn unsatisfiable_and_ignored() {
        assert_eq!(parse_range("bytes=1000-", 1000), RangeRequest::Unsatisfiable);
        assert_eq!(parse_range("bytes=-0", 1000), RangeRequest::Unsatisfiable);
        assert_eq!(parse_range("bytes=0-1,4-5", 1000), RangeRequest::Ignored);
        assert_eq!(parse_range("items=0-1", 1000), RangeRequest::Ignored);
        assert_eq!(parse_range("bytes=9-3", 1000), RangeRequest::Ignored);
        assert_eq!(parse_range("bytes=a-b", 1000), RangeRequest::Ignored);
    }
}
