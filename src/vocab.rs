//! The XSD datatype IRIs the literal model dereferences.
//!
//! The full vocabulary constant tables live above this crate; only the
//! datatypes that back typed literal columns are needed here.

/// `xsd:string`
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
/// `xsd:integer`
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
/// `xsd:double`
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
/// `xsd:boolean`
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
/// `xsd:dateTime`
pub const XSD_DATETIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
