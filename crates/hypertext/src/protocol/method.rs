//! Numeric request method codes.
//!
//! Consumers on the far side of the event channel identify the request method by a small
//! integer rather than by name. The numbering is the one used by the classic C `http_parser`
//! method table, so existing consumers can keep their lookup tables.

use http::Method;

/// Method names in code order; the index of a name is its code.
const METHOD_TABLE: [&str; 34] = [
    "DELETE",
    "GET",
    "HEAD",
    "POST",
    "PUT",
    "CONNECT",
    "OPTIONS",
    "TRACE",
    "COPY",
    "LOCK",
    "MKCOL",
    "MOVE",
    "PROPFIND",
    "PROPPATCH",
    "SEARCH",
    "UNLOCK",
    "BIND",
    "REBIND",
    "UNBIND",
    "ACL",
    "REPORT",
    "MKACTIVITY",
    "CHECKOUT",
    "MERGE",
    "M-SEARCH",
    "NOTIFY",
    "SUBSCRIBE",
    "UNSUBSCRIBE",
    "PATCH",
    "PURGE",
    "MKCALENDAR",
    "LINK",
    "UNLINK",
    "SOURCE",
];

/// Returns the numeric code of `method`, or `None` if the method is outside the known table.
pub fn method_code(method: &Method) -> Option<u8> {
    METHOD_TABLE.iter().position(|name| *name == method.as_str()).and_then(|index| u8::try_from(index).ok())
}

/// Returns the method registered under `code`.
pub fn method_from_code(code: u8) -> Option<Method> {
    let name = METHOD_TABLE.get(usize::from(code))?;
    Method::from_bytes(name.as_bytes()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_methods() {
        assert_eq!(method_code(&Method::DELETE), Some(0));
        assert_eq!(method_code(&Method::GET), Some(1));
        assert_eq!(method_code(&Method::POST), Some(3));
        assert_eq!(method_code(&Method::CONNECT), Some(5));
        assert_eq!(method_code(&Method::PATCH), Some(28));
    }

    #[test]
    fn extension_methods() {
        let m_search = Method::from_bytes(b"M-SEARCH").unwrap();
        assert_eq!(method_code(&m_search), Some(24));
        assert_eq!(method_from_code(24), Some(m_search));

        let unknown = Method::from_bytes(b"BREW").unwrap();
        assert_eq!(method_code(&unknown), None);
        assert_eq!(method_from_code(34), None);
    }

    #[test]
    fn codes_are_stable_both_ways() {
        for code in 0..34u8 {
            let method = method_from_code(code).unwrap();
            assert_eq!(method_code(&method), Some(code));
        }
    }
}
