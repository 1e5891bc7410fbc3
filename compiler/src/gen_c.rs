use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use colf_wire::DEPTH_MAX;

use crate::{
    error::ColfError,
    generator::{push_doc, GeneratedFile, Generator, Language, GENERATED_NOTICE},
    types::{Field, Package, ScalarType, Struct, StructRef},
    utils::{escape_keyword, quote, to_snake_case, to_upper_snake_case},
};

const C_KEYWORDS: [&str; 37] = [
    "auto", "bool", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "false", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "true",
    "typedef", "union", "unsigned", "void", "volatile", "while",
];

/// Declarations shared by all packages, ahead of the generated types.
const C_HEADER: &str = r#"#include <stdbool.h>
#include <stddef.h>
#include <stdint.h>

#ifdef __cplusplus
extern "C" {
#endif

// Result of a marshal or unmarshal call.
typedef enum {
	COLF_OK = 0,
	COLF_TRUNCATED,           // data ends within the serial
	COLF_SIZE_EXCEEDED,       // serial size exceeds the ceiling
	COLF_LIST_EXCEEDED,       // list length exceeds the ceiling
	COLF_FIELD_SIZE_EXCEEDED, // text or binary size exceeds the ceiling
	COLF_FIELD_INDEX,         // field index out of range
	COLF_FIELD_ORDER,         // field index not in ascending order
	COLF_HEADER,              // malformed field header
	COLF_OVERFLOW,            // integer exceeds its width
	COLF_BOOL,                // boolean byte other than 0 or 1
	COLF_NANOS,               // timestamp nanoseconds out of range
	COLF_DEPTH_EXCEEDED,      // struct nesting exceeds the ceiling
	COLF_NO_MEMORY,
} colf_status;

// Description of a status, for messages.
const char* colf_status_text(colf_status status);

// UTF-8 text; decoded text carries a terminating zero byte that len does not
// count.
typedef struct {
	char*  utf8;
	size_t len;
} colf_text;

typedef struct {
	uint8_t* octets;
	size_t   len;
} colf_binary;

// Seconds since the Unix epoch plus nanoseconds within the second.
typedef struct {
	int64_t  sec;
	uint32_t nsec;
} colf_timestamp;
"#;

/// Static helpers of `colf.c`, ahead of the generated functions.
const C_RUNTIME: &str = r#"const char* colf_status_text(colf_status status) {
	switch (status) {
	case COLF_OK:
		return "ok";
	case COLF_TRUNCATED:
		return "unexpected end of data";
	case COLF_SIZE_EXCEEDED:
		return "serial size exceeds the ceiling";
	case COLF_LIST_EXCEEDED:
		return "list length exceeds the ceiling";
	case COLF_FIELD_SIZE_EXCEEDED:
		return "field value size exceeds the ceiling";
	case COLF_FIELD_INDEX:
		return "field index out of range";
	case COLF_FIELD_ORDER:
		return "field index not in ascending order";
	case COLF_HEADER:
		return "malformed field header";
	case COLF_OVERFLOW:
		return "integer exceeds its width";
	case COLF_BOOL:
		return "invalid boolean byte";
	case COLF_NANOS:
		return "timestamp nanoseconds out of range";
	case COLF_DEPTH_EXCEEDED:
		return "struct nesting exceeds the ceiling";
	case COLF_NO_MEMORY:
		return "out of memory";
	}
	return "unknown status";
}

static uint32_t colf_float32_bits(float v) {
	uint32_t bits;
	memcpy(&bits, &v, sizeof bits);
	return bits;
}

static uint64_t colf_float64_bits(double v) {
	uint64_t bits;
	memcpy(&bits, &v, sizeof bits);
	return bits;
}

// An encoder keeps the first failure; later writes are ignored.
typedef struct {
	uint8_t*    buf;
	size_t      len, cap;
	int         depth; // instances open
	colf_status status;
} colf_encoder;

static void colf_encode_fail(colf_encoder* e, colf_status status) {
	if (e->status == COLF_OK) e->status = status;
}

// colf_reserve makes room for n more bytes; false once the encoder failed.
static bool colf_reserve(colf_encoder* e, size_t n) {
	if (e->status != COLF_OK) return false;
	if (n <= e->cap - e->len) return true;
	size_t cap = e->cap ? e->cap : 64;
	while (cap - e->len < n) cap *= 2;
	uint8_t* buf = realloc(e->buf, cap);
	if (!buf) {
		colf_encode_fail(e, COLF_NO_MEMORY);
		return false;
	}
	e->buf = buf;
	e->cap = cap;
	return true;
}

static void colf_put_byte(colf_encoder* e, uint8_t c) {
	if (colf_reserve(e, 1)) e->buf[e->len++] = c;
}

// colf_enter opens a struct instance; false when the encoder failed or the
// nesting exceeds the ceiling.
static bool colf_enter(colf_encoder* e) {
	if (e->status != COLF_OK) return false;
	if (e->depth >= COLF_DEPTH_MAX) {
		colf_encode_fail(e, COLF_DEPTH_EXCEEDED);
		return false;
	}
	e->depth++;
	return true;
}

// colf_start returns the index of the last present field, or -1 after
// writing the header of an empty struct.
static int colf_start(colf_encoder* e, const bool* present, int count) {
	int last = count - 1;
	while (last >= 0 && !present[last]) last--;
	if (last < 0) colf_put_byte(e, 0);
	return last;
}

static void colf_header(colf_encoder* e, int index, int last) {
	colf_put_byte(e, (uint8_t) ((index + 1) << 1 | (index == last)));
}

static void colf_put_uint(colf_encoder* e, uint64_t v) {
	while (v > 0x7f) {
		colf_put_byte(e, (uint8_t) (v | 0x80));
		v >>= 7;
	}
	colf_put_byte(e, (uint8_t) v);
}

static void colf_put_int(colf_encoder* e, int64_t v) {
	colf_put_uint(e, ((uint64_t) v << 1) ^ (v < 0 ? UINT64_MAX : 0));
}

static void colf_put_bool(colf_encoder* e, bool v) {
	colf_put_byte(e, v ? 1 : 0);
}

static void colf_put_le(colf_encoder* e, uint64_t bits, int n) {
	for (int k = 0; k < n; k++) colf_put_byte(e, (uint8_t) (bits >> (8 * k)));
}

static void colf_put_float32(colf_encoder* e, float v) {
	colf_put_le(e, colf_float32_bits(v), 4);
}

static void colf_put_float64(colf_encoder* e, double v) {
	colf_put_le(e, colf_float64_bits(v), 8);
}

static void colf_put_time(colf_encoder* e, colf_timestamp t) {
	if (t.nsec >= 1000000000u) {
		colf_encode_fail(e, COLF_NANOS);
		return;
	}
	colf_put_int(e, t.sec);
	colf_put_uint(e, t.nsec);
}

static void colf_put_count(colf_encoder* e, size_t n, size_t max) {
	if (n > max) colf_encode_fail(e, COLF_LIST_EXCEEDED);
	else colf_put_uint(e, n);
}

static void colf_put_bytes(colf_encoder* e, const void* p, size_t n, size_t max) {
	if (n > max) {
		colf_encode_fail(e, COLF_FIELD_SIZE_EXCEEDED);
		return;
	}
	colf_put_uint(e, n);
	if (n && colf_reserve(e, n)) {
		memcpy(e->buf + e->len, p, n);
		e->len += n;
	}
}

// colf_finish hands the serial over to the caller, or releases it on failure.
static colf_status colf_finish(colf_encoder* e, size_t max, uint8_t** data, size_t* len) {
	if (e->status == COLF_OK && e->len > max) e->status = COLF_SIZE_EXCEEDED;
	if (e->status != COLF_OK) {
		free(e->buf);
		return e->status;
	}
	*data = e->buf;
	*len = e->len;
	return COLF_OK;
}

// A decoder keeps the first failure; later reads return zero values.
typedef struct {
	const uint8_t* data;
	size_t         len;
	size_t         i;
	size_t         limit; // reads never pass this index
	int            depth; // instances open
	colf_status    status;
} colf_decoder;

static void colf_fail(colf_decoder* d, colf_status status) {
	if (d->status == COLF_OK) d->status = status;
}

// colf_take returns the next n bytes, or NULL once the decoder failed.
static const uint8_t* colf_take(colf_decoder* d, size_t n) {
	if (d->status != COLF_OK) return NULL;
	if (n > d->limit - d->i) {
		colf_fail(d, COLF_SIZE_EXCEEDED);
		return NULL;
	}
	if (n > d->len - d->i) {
		colf_fail(d, COLF_TRUNCATED);
		return NULL;
	}
	const uint8_t* p = d->data + d->i;
	d->i += n;
	return p;
}

static uint8_t colf_get_byte(colf_decoder* d) {
	const uint8_t* p = colf_take(d, 1);
	return p ? *p : 0;
}

// colf_open enters a struct instance; false when the decoder failed or the
// nesting exceeds the ceiling.
static bool colf_open(colf_decoder* d) {
	if (d->status != COLF_OK) return false;
	if (d->depth >= COLF_DEPTH_MAX) {
		colf_fail(d, COLF_DEPTH_EXCEEDED);
		return false;
	}
	d->depth++;
	return true;
}

// colf_get_uint reads a varint of at most bits significant bits, spread over
// no more than the bytes that width needs.
static uint64_t colf_get_uint(colf_decoder* d, unsigned bits) {
	uint64_t v = 0;
	for (unsigned shift = 0; shift < bits; shift += 7) {
		uint8_t c = colf_get_byte(d);
		if (d->status != COLF_OK) return 0;
		uint64_t payload = c & 0x7f;
		if (shift + 7 > bits && payload >> (bits - shift) != 0) {
			colf_fail(d, COLF_OVERFLOW);
			return 0;
		}
		v |= payload << shift;
		if (!(c & 0x80)) return v;
	}
	colf_fail(d, COLF_OVERFLOW);
	return 0;
}

static int64_t colf_get_int(colf_decoder* d, unsigned bits) {
	uint64_t v = colf_get_uint(d, bits);
	return (int64_t) (v >> 1) ^ -(int64_t) (v & 1);
}

static bool colf_get_bool(colf_decoder* d) {
	uint8_t c = colf_get_byte(d);
	if (c > 1) colf_fail(d, COLF_BOOL);
	return c == 1;
}

static uint64_t colf_get_le(colf_decoder* d, int n) {
	const uint8_t* p = colf_take(d, (size_t) n);
	uint64_t bits = 0;
	if (p)
		for (int k = 0; k < n; k++) bits |= (uint64_t) p[k] << (8 * k);
	return bits;
}

static float colf_get_float32(colf_decoder* d) {
	uint32_t bits = (uint32_t) colf_get_le(d, 4);
	float v;
	memcpy(&v, &bits, sizeof v);
	return v;
}

static double colf_get_float64(colf_decoder* d) {
	uint64_t bits = colf_get_le(d, 8);
	double v;
	memcpy(&v, &bits, sizeof v);
	return v;
}

static colf_timestamp colf_get_time(colf_decoder* d) {
	colf_timestamp t = {0, 0};
	t.sec = colf_get_int(d, 64);
	uint64_t ns = colf_get_uint(d, 32);
	if (ns >= 1000000000u) colf_fail(d, COLF_NANOS);
	else t.nsec = (uint32_t) ns;
	return t;
}

// colf_get_count reads a list element count. Every element takes at least
// one byte, so counts beyond the remaining input fail before allocation.
static size_t colf_get_count(colf_decoder* d, size_t max) {
	uint64_t n = colf_get_uint(d, 64);
	if (d->status != COLF_OK) return 0;
	if (n > max) {
		colf_fail(d, COLF_LIST_EXCEEDED);
		return 0;
	}
	if (n > d->limit - d->i) {
		colf_fail(d, COLF_SIZE_EXCEEDED);
		return 0;
	}
	if (n > d->len - d->i) {
		colf_fail(d, COLF_TRUNCATED);
		return 0;
	}
	return (size_t) n;
}

// colf_get_copy reads a byte string into memory from malloc, with a
// terminating zero byte that *len does not count.
static uint8_t* colf_get_copy(colf_decoder* d, size_t max, size_t* len) {
	uint64_t n = colf_get_uint(d, 64);
	if (d->status == COLF_OK && n > max) colf_fail(d, COLF_FIELD_SIZE_EXCEEDED);
	const uint8_t* p = colf_take(d, (size_t) n);
	if (!p) return NULL;
	uint8_t* copy = malloc((size_t) n + 1);
	if (!copy) {
		colf_fail(d, COLF_NO_MEMORY);
		return NULL;
	}
	memcpy(copy, p, (size_t) n);
	copy[n] = 0;
	*len = (size_t) n;
	return copy;
}

static colf_text colf_get_text(colf_decoder* d, size_t max) {
	colf_text t = {NULL, 0};
	t.utf8 = (char*) colf_get_copy(d, max, &t.len);
	return t;
}

static colf_binary colf_get_binary(colf_decoder* d, size_t max) {
	colf_binary b = {NULL, 0};
	b.octets = colf_get_copy(d, max, &b.len);
	return b;
}

// colf_scan tracks the field headers of one struct instance.
typedef struct {
	int  count, next;
	bool started, done;
} colf_scan;

// colf_field returns the index of the next present field, or -1 once the
// struct is complete or the decoder failed.
static int colf_field(colf_decoder* d, colf_scan* s) {
	if (s->done || d->status != COLF_OK) return -1;
	uint8_t h = colf_get_byte(d);
	if (d->status != COLF_OK) return -1;
	if (h == 0 && !s->started) {
		s->done = true;
		return -1;
	}
	if (h < 2) {
		colf_fail(d, COLF_HEADER);
		return -1;
	}
	int index = (h >> 1) - 1;
	if (index >= s->count) {
		colf_fail(d, COLF_FIELD_INDEX);
		return -1;
	}
	if (index < s->next) {
		colf_fail(d, COLF_FIELD_ORDER);
		return -1;
	}
	s->next = index + 1;
	s->started = true;
	s->done = h & 1;
	return index;
}
"#;

/// Generates `colf.h` and `colf.c` for all packages together. Type and
/// function names carry the package path as a prefix.
pub struct CGenerator;

impl Generator for CGenerator {
    fn language(&self) -> Language {
        Language::C
    }

    fn generate(&self, packages: &[Package]) -> Result<Vec<GeneratedFile>, ColfError> {
        check_names(packages)?;
        let structs = value_order(packages);
        Ok(vec![
            GeneratedFile { path: PathBuf::from("colf.h"), contents: compile_header(packages, &structs) },
            GeneratedFile { path: PathBuf::from("colf.c"), contents: compile_source(packages) },
        ])
    }
}

/// Identifier prefix of a package.
fn package_prefix(package: &str) -> String {
    package.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect()
}

fn type_name(package: &str, name: &str) -> String {
    format!("{}_{}", package_prefix(package), to_snake_case(name))
}

fn ref_type(r: &StructRef) -> String {
    type_name(&r.package, &r.name)
}

fn field_name(name: &str) -> String {
    escape_keyword(to_snake_case(name), &C_KEYWORDS)
}

fn macro_name(package: &str, ceiling: &str) -> String {
    format!("{}_{}", to_upper_snake_case(&package_prefix(package)), ceiling)
}

/// Generated names all live in one namespace, so distinct schema names must
/// not map onto the same identifier.
fn check_names(packages: &[Package]) -> Result<(), ColfError> {
    let mut seen: HashMap<String, String> = HashMap::new();
    for package in packages {
        for s in &package.structs {
            let owner = format!("{}.{}", package.name, s.name);
            let base = type_name(&package.name, &s.name);
            let names = ["", "_is_zero", "_encode", "_decode", "_marshal", "_unmarshal", "_free"];
            for suffix in names {
                let name = format!("{}{}", base, suffix);
                if let Some(other) = seen.insert(name.clone(), owner.clone()) {
                    if other != owner {
                        return Err(ColfError::Config(format!(
                            "structs {} and {} both map to C identifier {}",
                            quote(&other),
                            quote(&owner),
                            quote(&name)
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

/// All structs, each after the structs it holds by value.
fn value_order(packages: &[Package]) -> Vec<(&Package, &Struct)> {
    fn visit<'a>(
        packages: &'a [Package],
        package: &'a Package,
        s: &'a Struct,
        done: &mut HashSet<(&'a str, &'a str)>,
        order: &mut Vec<(&'a Package, &'a Struct)>,
    ) {
        if !done.insert((package.name.as_str(), s.name.as_str())) {
            return;
        }
        for f in &s.fields {
            let Some(r) = f.struct_ref() else { continue };
            if f.is_list || f.is_optional {
                continue;
            }
            let found = packages
                .iter()
                .find(|p| p.name == r.package)
                .and_then(|p| p.find_struct(&r.name).map(|dep| (p, dep)));
            if let Some((p, dep)) = found {
                visit(packages, p, dep, done, order);
            }
        }
        order.push((package, s));
    }

    let mut done = HashSet::new();
    let mut order = Vec::new();
    for package in packages {
        for s in &package.structs {
            visit(packages, package, s, &mut done, &mut order);
        }
    }
    order
}

fn element_type(field: &Field) -> String {
    match field.scalar() {
        Some(ScalarType::Bool) => "bool",
        Some(ScalarType::Int8) => "int8_t",
        Some(ScalarType::Int16) => "int16_t",
        Some(ScalarType::Int32) => "int32_t",
        Some(ScalarType::Int64) => "int64_t",
        Some(ScalarType::Uint8) => "uint8_t",
        Some(ScalarType::Uint16) => "uint16_t",
        Some(ScalarType::Uint32) => "uint32_t",
        Some(ScalarType::Uint64) => "uint64_t",
        Some(ScalarType::Float32) => "float",
        Some(ScalarType::Float64) => "double",
        Some(ScalarType::Timestamp) => "colf_timestamp",
        Some(ScalarType::Text) => "colf_text",
        Some(ScalarType::Binary) => "colf_binary",
        None => return field.struct_ref().map(ref_type).unwrap_or_default(),
    }
    .to_string()
}

fn size_max(package: &Package, field: &Field) -> String {
    field.size_max.map_or_else(|| macro_name(&package.name, "SIZE_MAX"), |n| n.to_string())
}

fn list_max(package: &Package, field: &Field) -> String {
    field.list_max.map_or_else(|| macro_name(&package.name, "LIST_MAX"), |n| n.to_string())
}

fn compile_header(packages: &[Package], structs: &[(&Package, &Struct)]) -> String {
    let mut lines = vec![format!("// {}", GENERATED_NOTICE), String::new()];
    lines.push("#ifndef COLF_H".to_string());
    lines.push("#define COLF_H".to_string());
    lines.push(String::new());
    lines.push(C_HEADER.trim_end().to_string());
    lines.push(String::new());
    lines.push("// Upper limit for struct nesting, the top-level instance included.".to_string());
    lines.push(format!("#define COLF_DEPTH_MAX {}", DEPTH_MAX));

    for package in packages {
        lines.push(String::new());
        if package.doc.is_empty() {
            lines.push(format!("// Package {}.", package.name));
        } else {
            push_doc(&mut lines, "", "// ", &package.doc);
        }
        lines.push(String::new());
        lines.push(format!("// Upper limit for serial byte sizes: {}.", package.size_max.expr));
        lines.push(format!("#define {} ((size_t) {})", macro_name(&package.name, "SIZE_MAX"), package.size_max.value));
        lines.push(format!("// Default upper limit for the number of list elements: {}.", package.list_max.expr));
        lines.push(format!("#define {} ((size_t) {})", macro_name(&package.name, "LIST_MAX"), package.list_max.value));
        lines.push(String::new());
        for s in &package.structs {
            let name = type_name(&package.name, &s.name);
            lines.push(format!("typedef struct {} {};", name, name));
        }
    }

    for (package, s) in structs {
        lines.push(String::new());
        push_struct(&mut lines, package, s);
    }

    for (package, s) in structs {
        let name = type_name(&package.name, &s.name);
        lines.push(String::new());
        lines.push(format!("// {}_marshal encodes o into memory from malloc, which *data points to", name));
        lines.push("// on success, with its size in *len.".to_string());
        lines.push(format!("colf_status {}_marshal(const {}* o, uint8_t** data, size_t* len);", name, name));
        lines.push(String::new());
        lines.push(format!("// {}_unmarshal decodes the serial at the start of data into o, and", name));
        lines.push("// stores the number of bytes read in *read unless read is NULL. Memory".to_string());
        lines.push("// o pointed to is not released. On failure o is left zeroed.".to_string());
        lines.push(format!(
            "colf_status {}_unmarshal({}* o, const uint8_t* data, size_t len, size_t* read);",
            name, name
        ));
        lines.push(String::new());
        lines.push(format!("// {}_free releases the memory o points to, which must come from", name));
        lines.push("// malloc, and zeroes o.".to_string());
        lines.push(format!("void {}_free({}* o);", name, name));
    }

    lines.push(String::new());
    lines.push("#ifdef __cplusplus".to_string());
    lines.push("} // extern \"C\"".to_string());
    lines.push("#endif".to_string());
    lines.push(String::new());
    lines.push("#endif // COLF_H".to_string());
    lines.push(String::new());
    lines.join("\n")
}

fn push_struct(lines: &mut Vec<String>, package: &Package, s: &Struct) {
    push_doc(lines, "", "// ", &s.doc);
    lines.push(format!("struct {} {{", type_name(&package.name, &s.name)));
    if s.fields.is_empty() {
        // C forbids structs without members.
        lines.push("\tchar unused;".to_string());
    }
    for f in &s.fields {
        push_doc(lines, "\t", "// ", &f.doc);
        let name = field_name(&f.name);
        let elem = element_type(f);
        if f.is_list {
            lines.push("\tstruct {".to_string());
            lines.push(format!("\t\t{}* list;", elem));
            lines.push("\t\tsize_t len;".to_string());
            lines.push(format!("\t}} {};", name));
        } else if f.is_optional {
            lines.push(format!("\t{}* {};", elem, name));
        } else {
            lines.push(format!("\t{} {};", elem, name));
        }
    }
    lines.push("};".to_string());
}

fn present_test(field: &Field, place: &str) -> String {
    if field.is_list {
        return format!("{}.len != 0", place);
    }
    if field.is_optional {
        return format!("{} != NULL", place);
    }
    match field.scalar() {
        Some(ScalarType::Bool) => place.to_string(),
        Some(ScalarType::Float32) => format!("colf_float32_bits({}) != 0", place),
        Some(ScalarType::Float64) => format!("colf_float64_bits({}) != 0", place),
        Some(ScalarType::Timestamp) => format!("({}.sec != 0 || {}.nsec != 0)", place, place),
        Some(ScalarType::Text | ScalarType::Binary) => format!("{}.len != 0", place),
        Some(_) => format!("{} != 0", place),
        None => format!("!{}_is_zero(&{})", element_type(field), place),
    }
}

fn zero_test(field: &Field, place: &str) -> String {
    if field.is_list {
        return format!("{}.len == 0", place);
    }
    if field.is_optional {
        return format!("{} == NULL", place);
    }
    match field.scalar() {
        Some(ScalarType::Bool) => format!("!{}", place),
        Some(ScalarType::Float32) => format!("colf_float32_bits({}) == 0", place),
        Some(ScalarType::Float64) => format!("colf_float64_bits({}) == 0", place),
        Some(ScalarType::Timestamp) => format!("{}.sec == 0 && {}.nsec == 0", place, place),
        Some(ScalarType::Text | ScalarType::Binary) => format!("{}.len == 0", place),
        Some(_) => format!("{} == 0", place),
        None => format!("{}_is_zero(&{})", element_type(field), place),
    }
}

/// Statement that appends one value; `ptr` addresses a struct value.
fn put_value(package: &Package, field: &Field, value: &str, ptr: &str) -> String {
    match field.scalar() {
        Some(ScalarType::Bool) => format!("colf_put_bool(e, {});", value),
        Some(ScalarType::Int8 | ScalarType::Int16 | ScalarType::Int32 | ScalarType::Int64) => {
            format!("colf_put_int(e, {});", value)
        }
        Some(ScalarType::Uint8 | ScalarType::Uint16 | ScalarType::Uint32 | ScalarType::Uint64) => {
            format!("colf_put_uint(e, {});", value)
        }
        Some(ScalarType::Float32) => format!("colf_put_float32(e, {});", value),
        Some(ScalarType::Float64) => format!("colf_put_float64(e, {});", value),
        Some(ScalarType::Timestamp) => format!("colf_put_time(e, {});", value),
        Some(ScalarType::Text) => {
            format!("colf_put_bytes(e, {}.utf8, {}.len, {});", value, value, size_max(package, field))
        }
        Some(ScalarType::Binary) => {
            format!("colf_put_bytes(e, {}.octets, {}.len, {});", value, value, size_max(package, field))
        }
        None => format!("{}_encode(e, {});", element_type(field), ptr),
    }
}

fn get_value(package: &Package, field: &Field) -> String {
    match field.scalar() {
        Some(ScalarType::Bool) => "colf_get_bool(d)".to_string(),
        Some(ScalarType::Int8) => "(int8_t) colf_get_int(d, 8)".to_string(),
        Some(ScalarType::Int16) => "(int16_t) colf_get_int(d, 16)".to_string(),
        Some(ScalarType::Int32) => "(int32_t) colf_get_int(d, 32)".to_string(),
        Some(ScalarType::Int64) => "colf_get_int(d, 64)".to_string(),
        Some(ScalarType::Uint8) => "(uint8_t) colf_get_uint(d, 8)".to_string(),
        Some(ScalarType::Uint16) => "(uint16_t) colf_get_uint(d, 16)".to_string(),
        Some(ScalarType::Uint32) => "(uint32_t) colf_get_uint(d, 32)".to_string(),
        Some(ScalarType::Uint64) => "colf_get_uint(d, 64)".to_string(),
        Some(ScalarType::Float32) => "colf_get_float32(d)".to_string(),
        Some(ScalarType::Float64) => "colf_get_float64(d)".to_string(),
        Some(ScalarType::Timestamp) => "colf_get_time(d)".to_string(),
        Some(ScalarType::Text) => format!("colf_get_text(d, {})", size_max(package, field)),
        Some(ScalarType::Binary) => format!("colf_get_binary(d, {})", size_max(package, field)),
        None => String::new(),
    }
}

fn compile_source(packages: &[Package]) -> String {
    let mut lines = vec![format!("// {}", GENERATED_NOTICE), String::new()];
    lines.push("#include \"colf.h\"".to_string());
    lines.push(String::new());
    lines.push("#include <stdlib.h>".to_string());
    lines.push("#include <string.h>".to_string());
    lines.push(String::new());
    lines.push(C_RUNTIME.trim_end().to_string());

    lines.push(String::new());
    for package in packages {
        for s in &package.structs {
            let name = type_name(&package.name, &s.name);
            lines.push(format!("static bool {}_is_zero(const {}* o);", name, name));
            lines.push(format!("static void {}_encode(colf_encoder* e, const {}* o);", name, name));
            lines.push(format!("static void {}_decode(colf_decoder* d, {}* o);", name, name));
        }
    }

    for package in packages {
        for s in &package.structs {
            generate_functions(&mut lines, package, s);
        }
    }
    lines.push(String::new());
    lines.join("\n")
}

fn generate_functions(lines: &mut Vec<String>, package: &Package, s: &Struct) {
    let name = type_name(&package.name, &s.name);
    let place = |f: &Field| format!("o->{}", field_name(&f.name));

    // is_zero
    lines.push(String::new());
    lines.push(format!("static bool {}_is_zero(const {}* o) {{", name, name));
    if s.fields.is_empty() {
        lines.push("\t(void) o;".to_string());
        lines.push("\treturn true;".to_string());
    } else {
        let tests: Vec<String> = s.fields.iter().map(|f| zero_test(f, &place(f))).collect();
        lines.push(format!("\treturn {};", tests.join("\n\t\t&& ")));
    }
    lines.push("}".to_string());

    // encode
    lines.push(String::new());
    lines.push(format!("static void {}_encode(colf_encoder* e, const {}* o) {{", name, name));
    lines.push("\tif (!colf_enter(e)) return;".to_string());
    if s.fields.is_empty() {
        lines.push("\t(void) o;".to_string());
        lines.push("\tcolf_start(e, NULL, 0);".to_string());
    } else {
        lines.push(format!("\tconst bool present[{}] = {{", s.fields.len()));
        for f in &s.fields {
            lines.push(format!("\t\t{},", present_test(f, &place(f))));
        }
        lines.push("\t};".to_string());
        lines.push(format!("\tint last = colf_start(e, present, {});", s.fields.len()));
        for (index, f) in s.fields.iter().enumerate() {
            let at = place(f);
            lines.push(format!("\tif (present[{}]) {{", index));
            lines.push(format!("\t\tcolf_header(e, {}, last);", index));
            if f.is_list {
                let elem = format!("{}.list[k]", at);
                lines.push(format!("\t\tcolf_put_count(e, {}.len, {});", at, list_max(package, f)));
                lines.push(format!("\t\tfor (size_t k = 0; k < {}.len; k++)", at));
                lines.push(format!("\t\t\t{}", put_value(package, f, &elem, &format!("&{}", elem))));
            } else if f.is_optional {
                lines.push(format!("\t\t{}", put_value(package, f, "", &at)));
            } else if f.scalar() != Some(ScalarType::Bool) {
                lines.push(format!("\t\t{}", put_value(package, f, &at, &format!("&{}", at))));
            }
            lines.push("\t}".to_string());
        }
    }
    lines.push("\te->depth--;".to_string());
    lines.push("}".to_string());

    // decode
    lines.push(String::new());
    lines.push(format!("static void {}_decode(colf_decoder* d, {}* o) {{", name, name));
    lines.push("\tif (!colf_open(d)) return;".to_string());
    if s.fields.is_empty() {
        lines.push("\t(void) o;".to_string());
    }
    lines.push(format!("\tcolf_scan s = {{{}, 0, false, false}};", s.fields.len()));
    if s.fields.is_empty() {
        lines.push("\tcolf_field(d, &s);".to_string());
    } else {
        lines.push("\tfor (int index = colf_field(d, &s); index >= 0; index = colf_field(d, &s)) {".to_string());
        lines.push("\t\tswitch (index) {".to_string());
        for (index, f) in s.fields.iter().enumerate() {
            lines.push(format!("\t\tcase {}: {{", index));
            get_field(lines, package, f, &place(f));
            lines.push("\t\t\tbreak;".to_string());
            lines.push("\t\t}".to_string());
        }
        lines.push("\t\t}".to_string());
        lines.push("\t}".to_string());
    }
    lines.push("\td->depth--;".to_string());
    lines.push("}".to_string());

    // marshal
    let size = macro_name(&package.name, "SIZE_MAX");
    lines.push(String::new());
    lines.push(format!("colf_status {}_marshal(const {}* o, uint8_t** data, size_t* len) {{", name, name));
    lines.push("\tcolf_encoder e = {NULL, 0, 0, 0, COLF_OK};".to_string());
    lines.push(format!("\t{}_encode(&e, o);", name));
    lines.push(format!("\treturn colf_finish(&e, {}, data, len);", size));
    lines.push("}".to_string());

    // unmarshal
    lines.push(String::new());
    lines.push(format!(
        "colf_status {}_unmarshal({}* o, const uint8_t* data, size_t len, size_t* read) {{",
        name, name
    ));
    lines.push(format!("\tcolf_decoder d = {{data, len, 0, {}, 0, COLF_OK}};", size));
    lines.push("\tmemset(o, 0, sizeof *o);".to_string());
    lines.push(format!("\t{}_decode(&d, o);", name));
    lines.push("\tif (d.status != COLF_OK) {".to_string());
    lines.push(format!("\t\t{}_free(o);", name));
    lines.push("\t\treturn d.status;".to_string());
    lines.push("\t}".to_string());
    lines.push("\tif (read) *read = d.i;".to_string());
    lines.push("\treturn COLF_OK;".to_string());
    lines.push("}".to_string());

    // free
    lines.push(String::new());
    lines.push(format!("void {}_free({}* o) {{", name, name));
    for f in &s.fields {
        free_field(lines, f, &place(f));
    }
    lines.push("\tmemset(o, 0, sizeof *o);".to_string());
    lines.push("}".to_string());
}

fn get_field(lines: &mut Vec<String>, package: &Package, f: &Field, place: &str) {
    if f.is_list {
        let list = format!("{}.list", place);
        lines.push(format!("\t\t\tsize_t n = colf_get_count(d, {});", list_max(package, f)));
        lines.push("\t\t\tif (n == 0) break;".to_string());
        lines.push(format!("\t\t\t{} = calloc(n, sizeof *{});", list, list));
        lines.push(format!("\t\t\tif (!{}) {{", list));
        lines.push("\t\t\t\tcolf_fail(d, COLF_NO_MEMORY);".to_string());
        lines.push("\t\t\t\tbreak;".to_string());
        lines.push("\t\t\t}".to_string());
        lines.push(format!("\t\t\t{}.len = n;", place));
        lines.push("\t\t\tfor (size_t k = 0; k < n && d->status == COLF_OK; k++)".to_string());
        if f.struct_ref().is_some() {
            lines.push(format!("\t\t\t\t{}_decode(d, &{}[k]);", element_type(f), list));
        } else {
            lines.push(format!("\t\t\t\t{}[k] = {};", list, get_value(package, f)));
        }
    } else if f.is_optional {
        lines.push(format!("\t\t\t{} = calloc(1, sizeof *{});", place, place));
        lines.push(format!("\t\t\tif (!{}) colf_fail(d, COLF_NO_MEMORY);", place));
        lines.push(format!("\t\t\telse {}_decode(d, {});", element_type(f), place));
    } else if f.struct_ref().is_some() {
        lines.push(format!("\t\t\t{}_decode(d, &{});", element_type(f), place));
    } else if f.scalar() == Some(ScalarType::Bool) {
        lines.push(format!("\t\t\t{} = true;", place));
    } else {
        lines.push(format!("\t\t\t{} = {};", place, get_value(package, f)));
    }
}

fn free_field(lines: &mut Vec<String>, f: &Field, place: &str) {
    let owned = |value: &str| match f.scalar() {
        Some(ScalarType::Text) => Some(format!("free({}.utf8);", value)),
        Some(ScalarType::Binary) => Some(format!("free({}.octets);", value)),
        None => Some(format!("{}_free(&{});", element_type(f), value)),
        Some(_) => None,
    };
    if f.is_list {
        let elem = format!("{}.list[k]", place);
        if let Some(release) = owned(&elem) {
            lines.push(format!("\tfor (size_t k = 0; k < {}.len; k++)", place));
            lines.push(format!("\t\t{}", release));
        }
        lines.push(format!("\tfree({}.list);", place));
    } else if f.is_optional {
        lines.push(format!("\tif ({}) {{", place));
        lines.push(format!("\t\t{}_free({});", element_type(f), place));
        lines.push(format!("\t\tfree({});", place));
        lines.push("\t}".to_string());
    } else if let Some(release) = owned(place) {
        lines.push(format!("\t{}", release));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, linker::link, parser::parse_source};

    fn compile(sources: &[(&str, &str)], config: &Config) -> Result<Vec<GeneratedFile>, ColfError> {
        let files: Vec<_> = sources.iter().map(|(p, t)| parse_source(p, t).unwrap()).collect();
        CGenerator.generate(&link(&files, config).unwrap())
    }

    #[test]
    fn test_c_point() {
        let files = compile(
            &[("demo.colf", "// Package demo is a test.\npackage demo\n// Point is a location.\ntype Point struct {\n\tx int32\n\ty int32\n}\n")],
            &Config::default().with_size_max("1024").unwrap(),
        )
        .unwrap();
        assert_eq!(files[0].path, PathBuf::from("colf.h"));
        assert_eq!(files[1].path, PathBuf::from("colf.c"));

        let header = &files[0].contents;
        assert!(header.starts_with("// Code generated by colf; DO NOT EDIT.\n\n#ifndef COLF_H\n"));
        assert!(header.contains("#define COLF_DEPTH_MAX 128\n"));
        assert!(header.contains("// Package demo is a test.\n\n// Upper limit for serial byte sizes: 1024.\n#define DEMO_SIZE_MAX ((size_t) 1024)\n"));
        assert!(header.contains("typedef struct demo_point demo_point;\n"));
        assert!(header.contains("// Point is a location.\nstruct demo_point {\n\tint32_t x;\n\tint32_t y;\n};"));
        assert!(header.contains("colf_status demo_point_marshal(const demo_point* o, uint8_t** data, size_t* len);"));

        let source = &files[1].contents;
        assert!(source.contains("\tconst bool present[2] = {\n\t\to->x != 0,\n\t\to->y != 0,\n\t};"));
        assert!(source.contains("\tif (present[1]) {\n\t\tcolf_header(e, 1, last);\n\t\tcolf_put_int(e, o->y);\n\t}"));
        assert!(source.contains("\t\tcase 0: {\n\t\t\to->x = (int32_t) colf_get_int(d, 32);\n\t\t\tbreak;\n\t\t}"));
        assert!(source.contains("\tcolf_decoder d = {data, len, 0, DEMO_SIZE_MAX, 0, COLF_OK};"));
        assert!(source.contains("\treturn colf_finish(&e, DEMO_SIZE_MAX, data, len);"));
    }

    #[test]
    fn test_c_value_order_and_kinds() {
        let files = compile(
            &[
                (
                    "a.colf",
                    "package demo\ntype Route struct {\n\tstops []geo.Point [list=3]\n\tnext *Route\n\tat geo.Point\n\tnames []text [size=8]\n\tcase bool\n}\n",
                ),
                ("b.colf", "package geo\ntype Point struct {\n\tlat float64\n}\ntype Empty struct {}\n"),
            ],
            &Config::new("out").with_prefix("example.com/app").unwrap(),
        )
        .unwrap();
        let header = &files[0].contents;
        let point = header.find("struct example_com_app_geo_point {").unwrap();
        let route = header.find("struct example_com_app_demo_route {").unwrap();
        assert!(point < route);
        assert!(header.contains("#define EXAMPLE_COM_APP_DEMO_LIST_MAX ((size_t) 65536)"));
        assert!(header.contains("\tstruct {\n\t\texample_com_app_geo_point* list;\n\t\tsize_t len;\n\t} stops;\n"));
        assert!(header.contains("\texample_com_app_demo_route* next;\n\texample_com_app_geo_point at;\n"));
        assert!(header.contains("\tbool case_;\n"));
        assert!(header.contains("struct example_com_app_geo_empty {\n\tchar unused;\n};"));

        let source = &files[1].contents;
        assert!(source.contains("\t\t!example_com_app_geo_point_is_zero(&o->at),\n"));
        assert!(source.contains("\t\tcolf_put_count(e, o->stops.len, 3);\n\t\tfor (size_t k = 0; k < o->stops.len; k++)\n\t\t\texample_com_app_geo_point_encode(e, &o->stops.list[k]);"));
        assert!(source.contains("\t\tcolf_header(e, 1, last);\n\t\texample_com_app_demo_route_encode(e, o->next);"));
        assert!(source.contains("\t\t\to->next = calloc(1, sizeof *o->next);"));
        assert!(source.contains("\t\t\t\to->names.list[k] = colf_get_text(d, 8);"));
        assert!(source.contains("\t\t\to->case_ = true;"));
        assert!(source.contains("\tfor (size_t k = 0; k < o->names.len; k++)\n\t\tfree(o->names.list[k].utf8);\n\tfree(o->names.list);"));
        assert!(source.contains("\tif (o->next) {\n\t\texample_com_app_demo_route_free(o->next);\n\t\tfree(o->next);\n\t}"));
        assert!(source.contains("\tif (!colf_open(d)) return;"));
        assert!(source.contains("\tif (!colf_enter(e)) return;"));
    }

    #[test]
    fn test_c_name_collision() {
        let err = compile(
            &[
                ("a.colf", "package a\ntype B_c struct {\n\tx int8\n}\n"),
                ("b.colf", "package a_b\ntype C struct {\n\tx int8\n}\n"),
            ],
            &Config::default(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: structs \"a.B_c\" and \"a_b.C\" both map to C identifier \"a_b_c\""
        );
    }

    #[test]
    fn test_c_rejects_directives() {
        let config = Config::new("out").with_snippet("int x;");
        match config.check_support("C", CGenerator.supports()) {
            Err(ColfError::Config(msg)) => assert_eq!(msg, "snippet not supported with C"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
