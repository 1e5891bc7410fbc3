use std::path::PathBuf;

use colf_wire::DEPTH_MAX;

use crate::{
    error::ColfError,
    generator::{push_doc, GeneratedFile, Generator, Language, GENERATED_NOTICE},
    types::{base_name, Field, Package, ScalarType, Struct, StructRef},
    utils::{escape_keyword, to_camel_case, to_pascal_case},
};

/// Property names taken by the generated class members.
const ECMA_MEMBERS: [&str; 6] = ["constructor", "isZero", "marshal", "marshalTo", "prototype", "unmarshal"];

/// Names an import namespace must not take: the module exports, the locals
/// of the generated methods and the words that can not be bindings.
const ECMA_RESERVED: &[&str] = &[
    "DEPTH_MAX", "DecodeError", "EncodeError", "LIST_MAX", "SIZE_MAX", "a", "arguments", "await", "break",
    "case", "catch", "class", "const", "continue", "d", "data", "debugger", "default", "delete", "depth",
    "do", "else", "end", "enum", "eval", "export", "extends", "false", "finally", "for", "function", "if",
    "implements", "import", "in", "index", "init", "instanceof", "interface", "k", "last", "let", "limit",
    "n", "new", "null", "o", "offset", "out", "package", "present", "private", "protected", "public",
    "return", "static", "super", "switch", "this", "throw", "true", "try", "typeof", "undefined", "v",
    "var", "void", "while", "with", "yield",
];

const ECMA_RUNTIME: &str = r#"// Wire helpers. Encoders append to a plain array of byte values; decoders
// track one struct instance in a state object.

const utf8Encoder = new TextEncoder();
const utf8Decoder = new TextDecoder();
const scratch = new DataView(new ArrayBuffer(8));

// start returns the index of the last present field, or -1 after writing the
// header of an empty struct.
function start(out, present) {
	const last = present.lastIndexOf(true);
	if (last < 0) out.push(0);
	return last;
}

function header(out, index, last) {
	out.push(((index + 1) << 1) | (index === last ? 1 : 0));
}

function putUint(out, v) {
	while (v > 0x7f) {
		out.push((v & 0x7f) | 0x80);
		v >>>= 7;
	}
	out.push(v);
}

function putInt(out, v) {
	putUint(out, ((v << 1) ^ (v >> 31)) >>> 0);
}

function putBigUint(out, v) {
	v = BigInt.asUintN(64, BigInt(v));
	while (v > 0x7fn) {
		out.push(Number(v & 0x7fn) | 0x80);
		v >>= 7n;
	}
	out.push(Number(v));
}

function putBigInt(out, v) {
	v = BigInt.asIntN(64, BigInt(v));
	putBigUint(out, (v << 1n) ^ (v >> 63n));
}

function putBool(out, v) {
	out.push(v ? 1 : 0);
}

function putFloat32(out, v) {
	scratch.setFloat32(0, v, true);
	for (let k = 0; k < 4; k++) out.push(scratch.getUint8(k));
}

function putFloat64(out, v) {
	scratch.setFloat64(0, v, true);
	for (let k = 0; k < 8; k++) out.push(scratch.getUint8(k));
}

// putTime writes a Date plus the nanoseconds within its millisecond.
function putTime(out, t, ns) {
	ns = ns || 0;
	if (!(ns >= 0 && ns < 1e6)) throw new EncodeError(`timestamp nanoseconds ${ns} out of range`);
	const ms = t ? t.getTime() : 0;
	const seconds = Math.floor(ms / 1000);
	putBigInt(out, BigInt(seconds));
	putUint(out, (ms - seconds * 1000) * 1e6 + ns);
}

function putCount(out, n, max) {
	if (n > max) throw new EncodeError(`list of ${n} elements exceeds the ceiling of ${max}`);
	putUint(out, n);
}

function putBytes(out, b, max) {
	b = b || new Uint8Array(0);
	if (b.length > max) throw new EncodeError(`field value of ${b.length} bytes exceeds the ceiling of ${max}`);
	putUint(out, b.length);
	for (const c of b) out.push(c);
}

function putText(out, s, max) {
	putBytes(out, utf8Encoder.encode(s || ''), max);
}

// decoder reads count fields of one struct instance inside depth others,
// never past index limit.
function decoder(data, offset, limit, count, depth) {
	const d = { data, i: offset, limit, count, depth: depth + 1, next: 0, started: false, done: false };
	if (depth >= DEPTH_MAX) throw fail(d, `struct nesting exceeds the ceiling of ${DEPTH_MAX} levels`);
	return d;
}

function fail(d, reason) {
	return new DecodeError(d.i, reason);
}

function take(d, n) {
	if (n > d.limit - d.i) throw fail(d, 'serial size exceeds the ceiling');
	if (n > d.data.length - d.i) throw fail(d, 'unexpected end of data');
	const at = d.i;
	d.i += n;
	return at;
}

function getByte(d) {
	return d.data[take(d, 1)];
}

// getUint reads a varint of at most bits (up to 32) significant bits.
function getUint(d, bits) {
	let v = 0;
	for (let shift = 0; shift < bits; shift += 7) {
		const c = getByte(d);
		const payload = c & 0x7f;
		if (shift + 7 > bits && payload >>> (bits - shift) !== 0) throw fail(d, `integer exceeds ${bits} bits`);
		v += payload * 2 ** shift;
		if (c < 0x80) return v;
	}
	throw fail(d, `integer exceeds ${bits} bits`);
}

function getInt(d, bits) {
	const u = getUint(d, bits);
	return u % 2 === 1 ? -(u + 1) / 2 : u / 2;
}

function getBigUint(d) {
	let v = 0n;
	for (let shift = 0n; shift < 64n; shift += 7n) {
		const c = getByte(d);
		const payload = BigInt(c & 0x7f);
		if (shift + 7n > 64n && payload >> (64n - shift) !== 0n) throw fail(d, 'integer exceeds 64 bits');
		v |= payload << shift;
		if (c < 0x80) return v;
	}
	throw fail(d, 'integer exceeds 64 bits');
}

function getBigInt(d) {
	const u = getBigUint(d);
	return (u >> 1n) ^ -(u & 1n);
}

function getBool(d) {
	const c = getByte(d);
	if (c > 1) throw fail(d, `invalid boolean byte ${c}`);
	return c === 1;
}

function getFloat32(d) {
	const at = take(d, 4);
	for (let k = 0; k < 4; k++) scratch.setUint8(k, d.data[at + k]);
	return scratch.getFloat32(0, true);
}

function getFloat64(d) {
	const at = take(d, 8);
	for (let k = 0; k < 8; k++) scratch.setUint8(k, d.data[at + k]);
	return scratch.getFloat64(0, true);
}

// getTime returns a Date and the nanoseconds within its millisecond.
function getTime(d) {
	const seconds = getBigInt(d);
	const nanos = getUint(d, 32);
	if (nanos >= 1e9) throw fail(d, `timestamp nanoseconds ${nanos} out of range`);
	const ms = Number(seconds) * 1000 + Math.floor(nanos / 1e6);
	if (!(Math.abs(ms) <= 8.64e15)) throw fail(d, `timestamp seconds ${seconds} out of range`);
	return [new Date(ms), nanos % 1e6];
}

// getCount rejects counts beyond the remaining input before allocation.
function getCount(d, max) {
	const n = getBigUint(d);
	if (n > BigInt(max)) throw fail(d, `list of ${n} elements exceeds the ceiling of ${max}`);
	if (n > BigInt(d.limit - d.i)) throw fail(d, 'serial size exceeds the ceiling');
	if (n > BigInt(d.data.length - d.i)) throw fail(d, 'unexpected end of data');
	return Number(n);
}

function getLen(d, max) {
	const n = getBigUint(d);
	if (n > BigInt(max)) throw fail(d, `field value of ${n} bytes exceeds the ceiling of ${max}`);
	return Number(n);
}

function getBytes(d, max) {
	const n = getLen(d, max);
	const at = take(d, n);
	return d.data.slice(at, at + n);
}

function getText(d, max) {
	const n = getLen(d, max);
	const at = take(d, n);
	return utf8Decoder.decode(d.data.subarray(at, at + n));
}

// field returns the index of the next present field, or -1 at the end of
// the struct.
function field(d) {
	if (d.done) return -1;
	const h = getByte(d);
	if (h === 0 && !d.started) {
		d.done = true;
		return -1;
	}
	if (h < 2) throw fail(d, `malformed field header ${h}`);
	const index = (h >> 1) - 1;
	if (index >= d.count) throw fail(d, `field index ${index} out of range for a struct with ${d.count} fields`);
	if (index < d.next) throw fail(d, `field index ${index} is not in ascending order`);
	d.next = index + 1;
	d.started = true;
	d.done = (h & 1) === 1;
	return index;
}
"#;

/// Generates an ES module `colf.js` per package.
pub struct EcmaGenerator;

impl Generator for EcmaGenerator {
    fn language(&self) -> Language {
        Language::ECMAScript
    }

    fn generate(&self, packages: &[Package]) -> Result<Vec<GeneratedFile>, ColfError> {
        Ok(packages
            .iter()
            .map(|p| GeneratedFile {
                path:     PathBuf::from(&p.name).join("colf.js"),
                contents: compile_package_to_ecma(p),
            })
            .collect())
    }
}

fn class_name(name: &str) -> String {
    to_pascal_case(name)
}

fn field_name(name: &str) -> String {
    escape_keyword(to_camel_case(name), &ECMA_MEMBERS)
}

/// Companion property with the sub-millisecond part of a timestamp.
fn nanos_name(name: &str) -> String {
    format!("{}Ns", field_name(name))
}

/// Module path of `to` as seen from the module of `from`.
fn relative_module(from: &str, to: &str) -> String {
    let from: Vec<&str> = from.split('/').collect();
    let to: Vec<&str> = to.split('/').collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut path = String::new();
    if common == from.len() {
        path.push_str("./");
    } else {
        path.push_str(&"../".repeat(from.len() - common));
    }
    for segment in &to[common..] {
        path.push_str(segment);
        path.push('/');
    }
    path + "colf.js"
}

fn identifier(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect()
}

/// Top-level declarations of the runtime.
fn runtime_names() -> impl Iterator<Item = &'static str> {
    ECMA_RUNTIME.lines().filter_map(|line| {
        let rest = line.strip_prefix("function ").or_else(|| line.strip_prefix("const "))?;
        rest.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).next()
    })
}

struct Context {
    /// (namespace alias, package name)
    imports: Vec<(String, String)>,
}

impl Context {
    fn new(package: &Package) -> Self {
        let mut taken: Vec<String> = ECMA_RESERVED.iter().copied().chain(runtime_names()).map(String::from).collect();
        taken.extend(package.structs.iter().map(|s| class_name(&s.name)));
        let mut imports = Vec::new();
        for dep in package.dependencies() {
            let mut alias = identifier(base_name(dep));
            if taken.contains(&alias) {
                alias = identifier(dep);
            }
            while taken.contains(&alias) {
                alias.push('_');
            }
            taken.push(alias.clone());
            imports.push((alias, dep.to_string()));
        }
        imports.sort_by(|a, b| a.1.cmp(&b.1));
        Context { imports }
    }

    fn struct_type(&self, r: &StructRef) -> String {
        match self.imports.iter().find(|(_, name)| *name == r.package) {
            Some((alias, _)) => format!("{}.{}", alias, class_name(&r.name)),
            None => class_name(&r.name),
        }
    }

    fn element_type(&self, field: &Field) -> String {
        match field.scalar() {
            Some(ScalarType::Bool) => "boolean".to_string(),
            Some(ScalarType::Int64 | ScalarType::Uint64) => "bigint".to_string(),
            Some(ScalarType::Timestamp) => "Date".to_string(),
            Some(ScalarType::Text) => "string".to_string(),
            Some(ScalarType::Binary) => "Uint8Array".to_string(),
            Some(_) => "number".to_string(),
            None => field.struct_ref().map(|r| self.struct_type(r)).unwrap_or_default(),
        }
    }

    fn js_doc_type(&self, field: &Field) -> String {
        let elem = self.element_type(field);
        if field.is_list {
            format!("{}[]", elem)
        } else if field.is_optional || field.scalar() == Some(ScalarType::Timestamp) {
            format!("?{}", elem)
        } else {
            elem
        }
    }

    fn default_value(&self, field: &Field) -> String {
        if field.is_list {
            return "[]".to_string();
        }
        if field.is_optional {
            return "null".to_string();
        }
        match field.scalar() {
            Some(ScalarType::Bool) => "false".to_string(),
            Some(ScalarType::Int64 | ScalarType::Uint64) => "0n".to_string(),
            Some(ScalarType::Timestamp) => "null".to_string(),
            Some(ScalarType::Text) => "''".to_string(),
            Some(ScalarType::Binary) => "new Uint8Array(0)".to_string(),
            Some(_) => "0".to_string(),
            None => format!("new {}()", self.element_type(field)),
        }
    }
}

fn zero_test(field: &Field) -> String {
    let place = format!("this.{}", field_name(&field.name));
    if field.is_list {
        return format!("(!{0} || {0}.length === 0)", place);
    }
    if field.is_optional {
        return format!("{} == null", place);
    }
    match field.scalar() {
        Some(ScalarType::Float32 | ScalarType::Float64) => format!("Object.is({}, 0)", place),
        Some(ScalarType::Timestamp) => {
            format!("(!{0} || {0}.getTime() === 0) && !this.{1}", place, nanos_name(&field.name))
        }
        Some(ScalarType::Binary) => format!("(!{0} || {0}.length === 0)", place),
        Some(_) => format!("!{}", place),
        None => format!("(!{0} || {0}.isZero())", place),
    }
}

fn present_test(field: &Field) -> String {
    let place = format!("this.{}", field_name(&field.name));
    if field.is_list {
        return format!("!{}", zero_test(field));
    }
    if field.is_optional {
        return format!("{} != null", place);
    }
    match field.scalar() {
        Some(ScalarType::Float32 | ScalarType::Float64 | ScalarType::Timestamp | ScalarType::Binary) | None => {
            format!("!({})", zero_test(field))
        }
        Some(_) => format!("!!{}", place),
    }
}

fn size_max(field: &Field) -> String {
    field.size_max.map_or_else(|| "SIZE_MAX".to_string(), |n| n.to_string())
}

fn list_max(field: &Field) -> String {
    field.list_max.map_or_else(|| "LIST_MAX".to_string(), |n| n.to_string())
}

/// Statement that appends `value`. List elements of timestamps carry no
/// nanosecond companion.
fn put_value(field: &Field, value: &str, element: bool) -> String {
    match field.scalar() {
        Some(ScalarType::Bool) => format!("putBool(out, {});", value),
        Some(ScalarType::Int8 | ScalarType::Int16 | ScalarType::Int32) => format!("putInt(out, {});", value),
        Some(ScalarType::Uint8 | ScalarType::Uint16 | ScalarType::Uint32) => format!("putUint(out, {});", value),
        Some(ScalarType::Int64) => format!("putBigInt(out, {});", value),
        Some(ScalarType::Uint64) => format!("putBigUint(out, {});", value),
        Some(ScalarType::Float32) => format!("putFloat32(out, {});", value),
        Some(ScalarType::Float64) => format!("putFloat64(out, {});", value),
        Some(ScalarType::Timestamp) if element => format!("putTime(out, {}, 0);", value),
        Some(ScalarType::Timestamp) => {
            format!("putTime(out, {}, this.{});", value, nanos_name(&field.name))
        }
        Some(ScalarType::Text) => format!("putText(out, {}, {});", value, size_max(field)),
        Some(ScalarType::Binary) => format!("putBytes(out, {}, {});", value, size_max(field)),
        None => format!("{}.marshalTo(out, depth + 1);", value),
    }
}

fn get_value(field: &Field) -> String {
    match field.scalar() {
        Some(ScalarType::Bool) => "getBool(d)".to_string(),
        Some(ScalarType::Int8) => "getInt(d, 8)".to_string(),
        Some(ScalarType::Int16) => "getInt(d, 16)".to_string(),
        Some(ScalarType::Int32) => "getInt(d, 32)".to_string(),
        Some(ScalarType::Uint8) => "getUint(d, 8)".to_string(),
        Some(ScalarType::Uint16) => "getUint(d, 16)".to_string(),
        Some(ScalarType::Uint32) => "getUint(d, 32)".to_string(),
        Some(ScalarType::Int64) => "getBigInt(d)".to_string(),
        Some(ScalarType::Uint64) => "getBigUint(d)".to_string(),
        Some(ScalarType::Float32) => "getFloat32(d)".to_string(),
        Some(ScalarType::Float64) => "getFloat64(d)".to_string(),
        Some(ScalarType::Timestamp) => "getTime(d)[0]".to_string(),
        Some(ScalarType::Text) => format!("getText(d, {})", size_max(field)),
        Some(ScalarType::Binary) => format!("getBytes(d, {})", size_max(field)),
        None => String::new(),
    }
}

fn push_js_doc(lines: &mut Vec<String>, indent: &str, doc: &[String], tags: &[String]) {
    if doc.is_empty() && tags.is_empty() {
        return;
    }
    lines.push(format!("{}/**", indent));
    push_doc(lines, indent, " * ", doc);
    for tag in tags {
        lines.push(format!("{} * {}", indent, tag));
    }
    lines.push(format!("{} */", indent));
}

/// Compiles one package into an ES module.
pub fn compile_package_to_ecma(package: &Package) -> String {
    let ctx = Context::new(package);
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("// {}", GENERATED_NOTICE));
    lines.push(String::new());
    if !package.doc.is_empty() {
        push_doc(&mut lines, "", "// ", &package.doc);
        lines.push(String::new());
    }
    if !ctx.imports.is_empty() {
        for (alias, name) in &ctx.imports {
            lines.push(format!("import * as {} from '{}';", alias, relative_module(&package.name, name)));
        }
        lines.push(String::new());
    }

    lines.push(format!("/** Upper limit for serial byte sizes: {}. */", package.size_max.expr));
    lines.push(format!("export const SIZE_MAX = {};", package.size_max.value));
    lines.push(String::new());
    lines.push(format!(
        "/** Default upper limit for the number of list elements: {}. */",
        package.list_max.expr
    ));
    lines.push(format!("export const LIST_MAX = {};", package.list_max.value));
    lines.push(String::new());
    lines.push("/** Upper limit for struct nesting, the top-level instance included. */".to_string());
    lines.push(format!("export const DEPTH_MAX = {};", DEPTH_MAX));
    lines.push(String::new());

    lines.push("/** Malformed input or a ceiling violation. */".to_string());
    lines.push("export class DecodeError extends Error {".to_string());
    lines.push("\tconstructor(offset, reason) {".to_string());
    lines.push("\t\tsuper(`colf: decode at byte ${offset}: ${reason}`);".to_string());
    lines.push("\t\tthis.offset = offset;".to_string());
    lines.push("\t}".to_string());
    lines.push("}".to_string());
    lines.push(String::new());
    lines.push("/** A value that exceeds a ceiling. */".to_string());
    lines.push("export class EncodeError extends Error {".to_string());
    lines.push("\tconstructor(reason) {".to_string());
    lines.push("\t\tsuper(`colf: encode: ${reason}`);".to_string());
    lines.push("\t}".to_string());
    lines.push("}".to_string());

    for s in &package.structs {
        lines.push(String::new());
        generate_class(&mut lines, &ctx, s);
    }

    lines.push(String::new());
    lines.push(ECMA_RUNTIME.trim_end().to_string());
    lines.push(String::new());
    lines.join("\n")
}

fn generate_class(lines: &mut Vec<String>, ctx: &Context, s: &Struct) {
    let name = class_name(&s.name);

    push_js_doc(lines, "", &s.doc, &[]);
    lines.push(format!("export class {} {{", name));

    lines.push(format!("\t/** @param {{Partial<{}>}} [init] field values */", name));
    lines.push("\tconstructor(init) {".to_string());
    for f in &s.fields {
        push_js_doc(lines, "\t\t", &f.doc, &[format!("@type {{{}}}", ctx.js_doc_type(f))]);
        lines.push(format!("\t\tthis.{} = {};", field_name(&f.name), ctx.default_value(f)));
        if f.scalar() == Some(ScalarType::Timestamp) && !f.is_list {
            lines.push(format!("\t\t/** Nanoseconds within the millisecond of {}. */", field_name(&f.name)));
            lines.push(format!("\t\tthis.{} = 0;", nanos_name(&f.name)));
        }
    }
    lines.push("\t\tif (init) Object.assign(this, init);".to_string());
    lines.push("\t}".to_string());
    lines.push(String::new());

    lines.push("\t/** Reports whether all fields hold their default value. */".to_string());
    lines.push("\tisZero() {".to_string());
    if s.fields.is_empty() {
        lines.push("\t\treturn true;".to_string());
    } else {
        let tests: Vec<String> = s.fields.iter().map(zero_test).collect();
        lines.push(format!("\t\treturn {};", tests.join("\n\t\t\t&& ")));
    }
    lines.push("\t}".to_string());
    lines.push(String::new());

    lines.push("\t/**".to_string());
    lines.push("\t * Appends the serial to out, an array of byte values. The size ceiling".to_string());
    lines.push("\t * is not checked; see marshal.".to_string());
    lines.push("\t * @param {number[]} out".to_string());
    lines.push("\t * @param {number} [depth] the number of enclosing instances".to_string());
    lines.push("\t */".to_string());
    lines.push("\tmarshalTo(out, depth = 0) {".to_string());
    lines.push("\t\tif (depth >= DEPTH_MAX)".to_string());
    lines.push("\t\t\tthrow new EncodeError(`struct nesting exceeds the ceiling of ${DEPTH_MAX} levels`);".to_string());
    if s.fields.is_empty() {
        lines.push("\t\tstart(out, []);".to_string());
    } else {
        lines.push("\t\tconst present = [".to_string());
        for f in &s.fields {
            lines.push(format!("\t\t\t{},", present_test(f)));
        }
        lines.push("\t\t];".to_string());
        lines.push("\t\tconst last = start(out, present);".to_string());
        for (index, f) in s.fields.iter().enumerate() {
            let place = format!("this.{}", field_name(&f.name));
            lines.push(format!("\t\tif (present[{}]) {{", index));
            lines.push(format!("\t\t\theader(out, {}, last);", index));
            if f.is_list {
                lines.push(format!("\t\t\tputCount(out, {}.length, {});", place, list_max(f)));
                lines.push(format!("\t\t\tfor (const v of {}) {{", place));
                if f.struct_ref().is_some() {
                    lines.push(format!("\t\t\t\t(v == null ? new {}() : v).marshalTo(out, depth + 1);", ctx.element_type(f)));
                } else {
                    lines.push(format!("\t\t\t\t{}", put_value(f, "v", true)));
                }
                lines.push("\t\t\t}".to_string());
            } else if f.scalar() != Some(ScalarType::Bool) {
                lines.push(format!("\t\t\t{}", put_value(f, &place, false)));
            }
            lines.push("\t\t}".to_string());
        }
    }
    lines.push("\t}".to_string());
    lines.push(String::new());

    lines.push("\t/**".to_string());
    lines.push("\t * Encodes this as a top-level serial.".to_string());
    lines.push("\t * @returns {Uint8Array}".to_string());
    lines.push("\t * @throws {EncodeError} when a value exceeds its ceiling.".to_string());
    lines.push("\t */".to_string());
    lines.push("\tmarshal() {".to_string());
    lines.push("\t\tconst out = [];".to_string());
    lines.push("\t\tthis.marshalTo(out);".to_string());
    lines.push("\t\tif (out.length > SIZE_MAX)".to_string());
    lines.push(
        "\t\t\tthrow new EncodeError(`serial size of ${out.length} bytes exceeds the ceiling of ${SIZE_MAX}`);"
            .to_string(),
    );
    lines.push("\t\treturn Uint8Array.from(out);".to_string());
    lines.push("\t}".to_string());
    lines.push(String::new());

    lines.push("\t/**".to_string());
    lines.push("\t * Decodes the serial at offset into this, reading up to index limit.".to_string());
    lines.push("\t * @param {Uint8Array} data".to_string());
    lines.push("\t * @param {number} [depth] the number of enclosing instances".to_string());
    lines.push("\t * @returns {number} the index after the serial.".to_string());
    lines.push("\t * @throws {DecodeError} when the data is malformed, truncated or exceeds a ceiling.".to_string());
    lines.push("\t */".to_string());
    lines.push("\tunmarshal(data, offset = 0, limit = offset + SIZE_MAX, depth = 0) {".to_string());
    lines.push(format!("\t\tconst d = decoder(data, offset, limit, {}, depth);", s.fields.len()));
    if s.fields.is_empty() {
        lines.push("\t\tfield(d);".to_string());
    } else {
        lines.push(format!("\t\tObject.assign(this, new {}());", name));
        lines.push("\t\tfor (let index = field(d); index >= 0; index = field(d)) {".to_string());
        lines.push("\t\t\tswitch (index) {".to_string());
        for (index, f) in s.fields.iter().enumerate() {
            lines.push(format!("\t\t\tcase {}: {{", index));
            get_field(lines, ctx, f);
            lines.push("\t\t\t\tbreak;".to_string());
            lines.push("\t\t\t}".to_string());
        }
        lines.push("\t\t\t}".to_string());
        lines.push("\t\t}".to_string());
    }
    lines.push("\t\treturn d.i;".to_string());
    lines.push("\t}".to_string());
    lines.push(String::new());

    lines.push("\t/**".to_string());
    lines.push("\t * Decodes data, which must hold exactly one serial.".to_string());
    lines.push(format!("\t * @returns {{{}}}", name));
    lines.push("\t */".to_string());
    lines.push("\tstatic decode(data) {".to_string());
    lines.push(format!("\t\tconst o = new {}();", name));
    lines.push("\t\tconst end = o.unmarshal(data);".to_string());
    lines.push("\t\tif (end < data.length) throw new DecodeError(end, 'data after the serial');".to_string());
    lines.push("\t\treturn o;".to_string());
    lines.push("\t}".to_string());
    lines.push("}".to_string());
}

fn get_field(lines: &mut Vec<String>, ctx: &Context, f: &Field) {
    let place = format!("this.{}", field_name(&f.name));
    if f.is_list {
        lines.push(format!("\t\t\t\tconst n = getCount(d, {});", list_max(f)));
        lines.push("\t\t\t\tconst a = new Array(n);".to_string());
        lines.push("\t\t\t\tfor (let k = 0; k < n; k++) {".to_string());
        if f.struct_ref().is_some() {
            lines.push(format!("\t\t\t\t\ta[k] = new {}();", ctx.element_type(f)));
            lines.push("\t\t\t\t\td.i = a[k].unmarshal(d.data, d.i, d.limit, d.depth);".to_string());
        } else {
            lines.push(format!("\t\t\t\t\ta[k] = {};", get_value(f)));
        }
        lines.push("\t\t\t\t}".to_string());
        lines.push(format!("\t\t\t\t{} = a;", place));
    } else if f.struct_ref().is_some() {
        lines.push(format!("\t\t\t\t{} = new {}();", place, ctx.element_type(f)));
        lines.push(format!("\t\t\t\td.i = {}.unmarshal(d.data, d.i, d.limit, d.depth);", place));
    } else if f.scalar() == Some(ScalarType::Bool) {
        lines.push(format!("\t\t\t\t{} = true;", place));
    } else if f.scalar() == Some(ScalarType::Timestamp) {
        lines.push(format!("\t\t\t\t[{}, this.{}] = getTime(d);", place, nanos_name(&f.name)));
    } else {
        lines.push(format!("\t\t\t\t{} = {};", place, get_value(f)));
    }
}
