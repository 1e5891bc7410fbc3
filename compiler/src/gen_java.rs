use std::path::PathBuf;

use colf_wire::DEPTH_MAX;

use crate::{
    config::Directive,
    error::ColfError,
    generator::{push_doc, GeneratedFile, Generator, Language, GENERATED_NOTICE},
    types::{Field, Package, ScalarType, Struct, StructRef},
    utils::{escape_keyword, indent, to_camel_case, to_pascal_case},
};

pub const JAVA_KEYWORDS: [&str; 53] = [
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "false", "final", "finally",
    "float", "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "null", "package", "private", "protected", "public", "return", "short",
    "static", "strictfp", "super", "switch", "synchronized", "this", "throw", "throws", "transient",
    "true", "try", "void", "volatile", "while",
];

/// Emits a class per struct plus a `Wire` class with the package ceilings
/// and the serialization helpers.
pub struct JavaGenerator;

impl Generator for JavaGenerator {
    fn language(&self) -> Language {
        Language::Java
    }

    fn supports(&self) -> &'static [Directive] {
        &[Directive::SuperClass, Directive::Interfaces, Directive::Snippet]
    }

    fn generate(&self, packages: &[Package]) -> Result<Vec<GeneratedFile>, ColfError> {
        let mut files = Vec::new();
        for package in packages {
            let dir = PathBuf::from(java_package(&package.name).replace('.', "/"));
            if !package.doc.is_empty() {
                files.push(GeneratedFile {
                    path:     dir.join("package-info.java"),
                    contents: compile_package_info(package),
                });
            }
            for s in &package.structs {
                files.push(GeneratedFile {
                    path:     dir.join(format!("{}.java", class_name(&s.name))),
                    contents: compile_struct_to_java(package, s),
                });
            }
            files.push(GeneratedFile { path: dir.join("Wire.java"), contents: compile_wire(package) });
        }
        Ok(files)
    }
}

/// Maps a package path onto a Java package name.
pub fn java_package(name: &str) -> String {
    name.split('/')
        .map(|segment| {
            let mut s: String =
                segment.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
            if s.starts_with(|c: char| c.is_ascii_digit()) {
                s.insert(0, '_');
            }
            escape_keyword(s, &JAVA_KEYWORDS)
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Maps a slash-separated class path from the command line onto a Java name.
fn java_class(path: &str) -> String {
    path.replace('/', ".")
}

fn class_name(name: &str) -> String {
    to_pascal_case(name)
}

fn field_name(name: &str) -> String {
    escape_keyword(to_camel_case(name), &JAVA_KEYWORDS)
}

fn struct_type(package: &Package, r: &StructRef) -> String {
    if r.package == package.name {
        class_name(&r.name)
    } else {
        format!("{}.{}", java_package(&r.package), class_name(&r.name))
    }
}

fn element_type(package: &Package, field: &Field) -> String {
    match field.scalar() {
        Some(ScalarType::Bool) => "boolean".to_string(),
        Some(ScalarType::Int8 | ScalarType::Uint8) => "byte".to_string(),
        Some(ScalarType::Int16 | ScalarType::Uint16) => "short".to_string(),
        Some(ScalarType::Int32 | ScalarType::Uint32) => "int".to_string(),
        Some(ScalarType::Int64 | ScalarType::Uint64) => "long".to_string(),
        Some(ScalarType::Float32) => "float".to_string(),
        Some(ScalarType::Float64) => "double".to_string(),
        Some(ScalarType::Timestamp) => "Instant".to_string(),
        Some(ScalarType::Text) => "String".to_string(),
        Some(ScalarType::Binary) => "byte[]".to_string(),
        None => field.struct_ref().map(|r| struct_type(package, r)).unwrap_or_default(),
    }
}

fn field_type(package: &Package, field: &Field) -> String {
    let elem = element_type(package, field);
    if field.is_list {
        format!("{}[]", elem)
    } else {
        elem
    }
}

/// `new T[n]` for array element type `T`, which may itself be an array.
fn new_array(elem: &str, len: &str) -> String {
    match elem.find('[') {
        Some(at) => format!("new {}[{}]{}", &elem[..at], len, &elem[at..]),
        None => format!("new {}[{}]", elem, len),
    }
}

fn default_value(package: &Package, field: &Field) -> String {
    let elem = element_type(package, field);
    if field.is_list {
        return new_array(&elem, "0");
    }
    if field.is_optional {
        return "null".to_string();
    }
    match field.scalar() {
        Some(ScalarType::Bool) => "false".to_string(),
        Some(ScalarType::Int64 | ScalarType::Uint64) => "0L".to_string(),
        Some(ScalarType::Float32) => "0f".to_string(),
        Some(ScalarType::Float64) => "0d".to_string(),
        Some(ScalarType::Timestamp) => "Instant.EPOCH".to_string(),
        Some(ScalarType::Text) => "\"\"".to_string(),
        Some(ScalarType::Binary) => "new byte[0]".to_string(),
        Some(_) => "0".to_string(),
        None => format!("new {}()", elem),
    }
}

/// Null counts as the default for reference types.
fn zero_test(field: &Field, place: &str) -> String {
    if field.is_list {
        return format!("({0} == null || {0}.length == 0)", place);
    }
    if field.is_optional {
        return format!("{} == null", place);
    }
    match field.scalar() {
        Some(ScalarType::Bool) => format!("!{}", place),
        Some(ScalarType::Float32) => format!("Float.floatToRawIntBits({}) == 0", place),
        Some(ScalarType::Float64) => format!("Double.doubleToRawLongBits({}) == 0", place),
        Some(ScalarType::Timestamp) => format!("({0} == null || Instant.EPOCH.equals({0}))", place),
        Some(ScalarType::Text) => format!("({0} == null || {0}.isEmpty())", place),
        Some(ScalarType::Binary) => format!("({0} == null || {0}.length == 0)", place),
        Some(_) => format!("{} == 0", place),
        None => format!("({0} == null || {0}.isZero())", place),
    }
}

fn present_test(field: &Field, place: &str) -> String {
    if field.is_list {
        return format!("{0} != null && {0}.length != 0", place);
    }
    if field.is_optional {
        return format!("{} != null", place);
    }
    match field.scalar() {
        Some(ScalarType::Bool) => place.to_string(),
        Some(ScalarType::Float32) => format!("Float.floatToRawIntBits({}) != 0", place),
        Some(ScalarType::Float64) => format!("Double.doubleToRawLongBits({}) != 0", place),
        Some(ScalarType::Timestamp | ScalarType::Text | ScalarType::Binary) | None => {
            format!("!{}", zero_test(field, place))
        }
        Some(_) => format!("{} != 0", place),
    }
}

fn size_max(field: &Field) -> String {
    field.size_max.map_or_else(|| "Wire.SIZE_MAX".to_string(), |n| n.to_string())
}

fn list_max(field: &Field) -> String {
    field.list_max.map_or_else(|| "Wire.LIST_MAX".to_string(), |n| n.to_string())
}

fn put_value(field: &Field, value: &str) -> String {
    match field.scalar() {
        Some(ScalarType::Bool) => format!("Wire.putBool(out, {});", value),
        Some(ScalarType::Int8 | ScalarType::Int16 | ScalarType::Int32 | ScalarType::Int64) => {
            format!("Wire.putInt(out, {});", value)
        }
        Some(ScalarType::Uint8) => format!("Wire.putUint(out, {} & 0xFFL);", value),
        Some(ScalarType::Uint16) => format!("Wire.putUint(out, {} & 0xFFFFL);", value),
        Some(ScalarType::Uint32) => format!("Wire.putUint(out, {} & 0xFFFFFFFFL);", value),
        Some(ScalarType::Uint64) => format!("Wire.putUint(out, {});", value),
        Some(ScalarType::Float32) => format!("Wire.putFloat32(out, {});", value),
        Some(ScalarType::Float64) => format!("Wire.putFloat64(out, {});", value),
        Some(ScalarType::Timestamp) => format!("Wire.putTime(out, {});", value),
        Some(ScalarType::Text) => format!("Wire.putText(out, {}, {});", value, size_max(field)),
        Some(ScalarType::Binary) => format!("Wire.putBytes(out, {}, {});", value, size_max(field)),
        None => format!("{}.marshalTo(out, depth + 1);", value),
    }
}

fn get_value(field: &Field) -> String {
    match field.scalar() {
        Some(ScalarType::Bool) => "d.getBool()".to_string(),
        Some(ScalarType::Int8) => "(byte) d.getInt(8)".to_string(),
        Some(ScalarType::Int16) => "(short) d.getInt(16)".to_string(),
        Some(ScalarType::Int32) => "(int) d.getInt(32)".to_string(),
        Some(ScalarType::Int64) => "d.getInt(64)".to_string(),
        Some(ScalarType::Uint8) => "(byte) d.getUint(8)".to_string(),
        Some(ScalarType::Uint16) => "(short) d.getUint(16)".to_string(),
        Some(ScalarType::Uint32) => "(int) d.getUint(32)".to_string(),
        Some(ScalarType::Uint64) => "d.getUint(64)".to_string(),
        Some(ScalarType::Float32) => "d.getFloat32()".to_string(),
        Some(ScalarType::Float64) => "d.getFloat64()".to_string(),
        Some(ScalarType::Timestamp) => "d.getTime()".to_string(),
        Some(ScalarType::Text) => format!("d.getText({})", size_max(field)),
        Some(ScalarType::Binary) => format!("d.getBytes({})", size_max(field)),
        None => String::new(),
    }
}

fn push_javadoc(lines: &mut Vec<String>, indent: &str, doc: &[String]) {
    if doc.is_empty() {
        return;
    }
    lines.push(format!("{}/**", indent));
    push_doc(lines, indent, " * ", doc);
    lines.push(format!("{} */", indent));
}

fn compile_package_info(package: &Package) -> String {
    let mut lines = vec![format!("// {}", GENERATED_NOTICE), String::new()];
    push_javadoc(&mut lines, "", &package.doc);
    lines.push(format!("package {};", java_package(&package.name)));
    lines.push(String::new());
    lines.join("\n")
}

/// Compiles one struct into the source of its Java class.
pub fn compile_struct_to_java(package: &Package, s: &Struct) -> String {
    let name = class_name(&s.name);
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("// {}", GENERATED_NOTICE));
    lines.push(String::new());
    lines.push(format!("package {};", java_package(&package.name)));
    lines.push(String::new());
    lines.push("import java.io.ByteArrayOutputStream;".to_string());
    if s.fields.iter().any(|f| f.scalar() == Some(ScalarType::Timestamp)) {
        lines.push("import java.time.Instant;".to_string());
    }
    lines.push(String::new());

    push_javadoc(&mut lines, "", &s.doc);
    let mut decl = format!("public class {}", name);
    if let Some(super_class) = &package.super_class {
        decl.push_str(&format!(" extends {}", java_class(super_class)));
    }
    if !package.interfaces.is_empty() {
        let interfaces: Vec<String> = package.interfaces.iter().map(|i| java_class(i)).collect();
        decl.push_str(&format!(" implements {}", interfaces.join(", ")));
    }
    lines.push(decl + " {");

    for f in &s.fields {
        lines.push(String::new());
        push_javadoc(&mut lines, "\t", &f.doc);
        lines.push(format!(
            "\tpublic {} {} = {};",
            field_type(package, f),
            field_name(&f.name),
            default_value(package, f)
        ));
    }

    if let Some(snippet) = &package.snippet {
        lines.push(String::new());
        lines.push(indent(snippet.trim_end(), "\t"));
    }

    // isZero
    lines.push(String::new());
    lines.push("\t/** Reports whether all fields hold their default value. */".to_string());
    lines.push("\tpublic boolean isZero() {".to_string());
    if s.fields.is_empty() {
        lines.push("\t\treturn true;".to_string());
    } else {
        let tests: Vec<String> = s
            .fields
            .iter()
            .map(|f| zero_test(f, &format!("this.{}", field_name(&f.name))))
            .collect();
        lines.push(format!("\t\treturn {};", tests.join("\n\t\t\t&& ")));
    }
    lines.push("\t}".to_string());

    // marshalTo
    lines.push(String::new());
    lines.push("\t/**".to_string());
    lines.push("\t * Appends the serial to out. The size ceiling is not checked; see marshal().".to_string());
    lines.push("\t * @throws IllegalStateException when a value exceeds its ceiling.".to_string());
    lines.push("\t */".to_string());
    lines.push("\tpublic void marshalTo(ByteArrayOutputStream out) {".to_string());
    lines.push("\t\tmarshalTo(out, 0);".to_string());
    lines.push("\t}".to_string());
    lines.push(String::new());
    lines.push("\t/** Appends the serial of an instance inside depth others to out. */".to_string());
    lines.push("\tpublic void marshalTo(ByteArrayOutputStream out, int depth) {".to_string());
    lines.push("\t\tif (depth >= Wire.DEPTH_MAX)".to_string());
    lines.push(
        "\t\t\tthrow new IllegalStateException(String.format(\"colf: struct nesting exceeds the ceiling of %d levels\", Wire.DEPTH_MAX));"
            .to_string(),
    );
    if s.fields.is_empty() {
        lines.push("\t\tWire.start(out, new boolean[0]);".to_string());
    } else {
        lines.push("\t\tboolean[] present = {".to_string());
        for f in &s.fields {
            lines.push(format!("\t\t\t{},", present_test(f, &format!("this.{}", field_name(&f.name)))));
        }
        lines.push("\t\t};".to_string());
        lines.push("\t\tint last = Wire.start(out, present);".to_string());
        for (index, f) in s.fields.iter().enumerate() {
            let place = format!("this.{}", field_name(&f.name));
            lines.push(format!("\t\tif (present[{}]) {{", index));
            lines.push(format!("\t\t\tWire.header(out, {}, last);", index));
            if f.is_list {
                lines.push(format!("\t\t\tWire.putCount(out, {}.length, {});", place, list_max(f)));
                lines.push(format!("\t\t\tfor ({} v : {}) {{", element_type(package, f), place));
                if f.struct_ref().is_some() {
                    // null elements encode as empty structs
                    lines.push(format!("\t\t\t\tif (v == null) new {}().marshalTo(out, depth + 1);", element_type(package, f)));
                    lines.push("\t\t\t\telse v.marshalTo(out, depth + 1);".to_string());
                } else {
                    lines.push(format!("\t\t\t\t{}", put_value(f, "v")));
                }
                lines.push("\t\t\t}".to_string());
            } else if f.scalar() != Some(ScalarType::Bool) {
                lines.push(format!("\t\t\t{}", put_value(f, &place)));
            }
            lines.push("\t\t}".to_string());
        }
    }
    lines.push("\t}".to_string());

    // marshal
    lines.push(String::new());
    lines.push("\t/**".to_string());
    lines.push("\t * Encodes this as a top-level serial.".to_string());
    lines.push("\t * @throws IllegalStateException when a value exceeds its ceiling.".to_string());
    lines.push("\t */".to_string());
    lines.push("\tpublic byte[] marshal() {".to_string());
    lines.push("\t\tByteArrayOutputStream out = new ByteArrayOutputStream();".to_string());
    lines.push("\t\tmarshalTo(out);".to_string());
    lines.push("\t\tif (out.size() > Wire.SIZE_MAX)".to_string());
    lines.push(
        "\t\t\tthrow new IllegalStateException(String.format(\"colf: serial size of %d bytes exceeds the ceiling of %d\", out.size(), Wire.SIZE_MAX));"
            .to_string(),
    );
    lines.push("\t\treturn out.toByteArray();".to_string());
    lines.push("\t}".to_string());

    // unmarshal
    lines.push(String::new());
    lines.push("\t/**".to_string());
    lines.push("\t * Decodes the serial at offset into this, reading up to index limit.".to_string());
    lines.push("\t * @return the index after the serial.".to_string());
    lines.push("\t * @throws java.util.InputMismatchException when the data is malformed or exceeds a ceiling.".to_string());
    lines.push("\t * @throws java.nio.BufferUnderflowException when the data ends early.".to_string());
    lines.push("\t */".to_string());
    lines.push("\tpublic int unmarshal(byte[] buf, int offset, int limit) {".to_string());
    lines.push("\t\treturn unmarshal(buf, offset, limit, 0);".to_string());
    lines.push("\t}".to_string());
    lines.push(String::new());
    lines.push("\t/** Decodes the serial of an instance inside depth others. */".to_string());
    lines.push("\tpublic int unmarshal(byte[] buf, int offset, int limit, int depth) {".to_string());
    lines.push(format!("\t\tWire.Decoder d = new Wire.Decoder(buf, offset, limit, {}, depth);", s.fields.len()));
    if s.fields.is_empty() {
        lines.push("\t\td.field();".to_string());
    } else {
        for f in &s.fields {
            lines.push(format!("\t\tthis.{} = {};", field_name(&f.name), default_value(package, f)));
        }
        lines.push("\t\tfor (int index = d.field(); index >= 0; index = d.field()) {".to_string());
        lines.push("\t\t\tswitch (index) {".to_string());
        for (index, f) in s.fields.iter().enumerate() {
            lines.push(format!("\t\t\tcase {}: {{", index));
            get_field(&mut lines, package, f);
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
    lines.push("\t * Decodes data, which must hold exactly one serial, into this.".to_string());
    lines.push("\t * @return this.".to_string());
    lines.push("\t */".to_string());
    lines.push(format!("\tpublic {} unmarshal(byte[] data) {{", name));
    lines.push("\t\tint end = unmarshal(data, 0, Wire.SIZE_MAX);".to_string());
    lines.push("\t\tif (end < data.length)".to_string());
    lines.push(
        "\t\t\tthrow new java.util.InputMismatchException(\"colf: decode at byte \" + end + \": data after the serial\");"
            .to_string(),
    );
    lines.push("\t\treturn this;".to_string());
    lines.push("\t}".to_string());

    lines.push("}".to_string());
    lines.push(String::new());
    lines.join("\n")
}

fn get_field(lines: &mut Vec<String>, package: &Package, f: &Field) {
    let place = format!("this.{}", field_name(&f.name));
    let elem = element_type(package, f);
    if f.is_list {
        lines.push(format!("\t\t\t\tint n = d.getCount({});", list_max(f)));
        lines.push(format!("\t\t\t\t{}[] a = {};", elem, new_array(&elem, "n")));
        lines.push("\t\t\t\tfor (int i = 0; i < n; i++) {".to_string());
        if f.struct_ref().is_some() {
            lines.push(format!("\t\t\t\t\ta[i] = new {}();", elem));
            lines.push("\t\t\t\t\td.i = a[i].unmarshal(d.buf, d.i, d.limit, d.depth);".to_string());
        } else {
            lines.push(format!("\t\t\t\t\ta[i] = {};", get_value(f)));
        }
        lines.push("\t\t\t\t}".to_string());
        lines.push(format!("\t\t\t\t{} = a;", place));
    } else if f.struct_ref().is_some() {
        lines.push(format!("\t\t\t\t{} = new {}();", place, elem));
        lines.push(format!("\t\t\t\td.i = {}.unmarshal(d.buf, d.i, d.limit, d.depth);", place));
    } else if f.scalar() == Some(ScalarType::Bool) {
        lines.push(format!("\t\t\t\t{} = true;", place));
    } else {
        lines.push(format!("\t\t\t\t{} = {};", place, get_value(f)));
    }
}

const JAVA_WIRE: &str = r#"	private Wire() {}

	/**
	 * Writes the header of an empty struct when no field is present.
	 * @return the index of the last present field, or -1.
	 */
	static int start(ByteArrayOutputStream out, boolean[] present) {
		int last = -1;
		for (int i = 0; i < present.length; i++)
			if (present[i]) last = i;
		if (last < 0) out.write(0);
		return last;
	}

	static void header(ByteArrayOutputStream out, int index, int last) {
		out.write((index + 1) << 1 | (index == last ? 1 : 0));
	}

	static void putUint(ByteArrayOutputStream out, long v) {
		while ((v & ~0x7FL) != 0) {
			out.write((int) (v & 0x7F | 0x80));
			v >>>= 7;
		}
		out.write((int) v);
	}

	static void putInt(ByteArrayOutputStream out, long v) {
		putUint(out, v << 1 ^ v >> 63);
	}

	static void putBool(ByteArrayOutputStream out, boolean v) {
		out.write(v ? 1 : 0);
	}

	static void putFloat32(ByteArrayOutputStream out, float v) {
		int bits = Float.floatToRawIntBits(v);
		for (int shift = 0; shift < 32; shift += 8)
			out.write(bits >>> shift);
	}

	static void putFloat64(ByteArrayOutputStream out, double v) {
		long bits = Double.doubleToRawLongBits(v);
		for (int shift = 0; shift < 64; shift += 8)
			out.write((int) (bits >>> shift));
	}

	static void putTime(ByteArrayOutputStream out, Instant t) {
		if (t == null) t = Instant.EPOCH;
		putInt(out, t.getEpochSecond());
		putUint(out, t.getNano());
	}

	static void putCount(ByteArrayOutputStream out, int n, int max) {
		if (n > max)
			throw new IllegalStateException(String.format("colf: list of %d elements exceeds the ceiling of %d", n, max));
		putUint(out, n);
	}

	static void putBytes(ByteArrayOutputStream out, byte[] b, int max) {
		if (b == null) b = new byte[0];
		if (b.length > max)
			throw new IllegalStateException(String.format("colf: field value of %d bytes exceeds the ceiling of %d", b.length, max));
		putUint(out, b.length);
		out.write(b, 0, b.length);
	}

	static void putText(ByteArrayOutputStream out, String s, int max) {
		putBytes(out, s == null ? null : s.getBytes(StandardCharsets.UTF_8), max);
	}

	/** Reads one struct instance. */
	static final class Decoder {

		final byte[] buf;
		/** Reads never pass this index. */
		final int limit;
		/** Instances open, this one included. */
		final int depth;
		int i;

		private final int count;
		private int next;
		private boolean started, done;

		Decoder(byte[] buf, int offset, int limit, int count, int depth) {
			this.buf = buf;
			this.i = offset;
			this.limit = limit;
			this.count = count;
			this.depth = depth + 1;
			if (depth >= DEPTH_MAX) throw fail("struct nesting exceeds the ceiling of %d levels", DEPTH_MAX);
		}

		InputMismatchException fail(String format, Object... args) {
			return new InputMismatchException("colf: decode at byte " + i + ": " + String.format(format, args));
		}

		private int take(int n) {
			if (n > limit - i) throw fail("serial size exceeds the ceiling");
			if (n > buf.length - i) throw new BufferUnderflowException();
			int start = i;
			i += n;
			return start;
		}

		int getByte() {
			return buf[take(1)] & 0xFF;
		}

		/** Reads a varint of at most bits significant bits. */
		long getUint(int bits) {
			long v = 0;
			for (int shift = 0; shift < bits; shift += 7) {
				int c = getByte();
				long payload = c & 0x7F;
				if (shift + 7 > bits && payload >>> (bits - shift) != 0)
					throw fail("integer exceeds %d bits", bits);
				v |= payload << shift;
				if ((c & 0x80) == 0) return v;
			}
			throw fail("integer exceeds %d bits", bits);
		}

		long getInt(int bits) {
			long u = getUint(bits);
			return u >>> 1 ^ -(u & 1);
		}

		boolean getBool() {
			int c = getByte();
			if (c > 1) throw fail("invalid boolean byte 0x%02x", c);
			return c == 1;
		}

		float getFloat32() {
			int start = take(4);
			int bits = 0;
			for (int k = 3; k >= 0; k--)
				bits = bits << 8 | buf[start + k] & 0xFF;
			return Float.intBitsToFloat(bits);
		}

		double getFloat64() {
			int start = take(8);
			long bits = 0;
			for (int k = 7; k >= 0; k--)
				bits = bits << 8 | buf[start + k] & 0xFF;
			return Double.longBitsToDouble(bits);
		}

		Instant getTime() {
			long seconds = getInt(64);
			long nanos = getUint(32);
			if (nanos >= 1_000_000_000L) throw fail("timestamp nanoseconds %d out of range", nanos);
			try {
				return Instant.ofEpochSecond(seconds, nanos);
			} catch (DateTimeException e) {
				throw fail("timestamp seconds %d out of range", seconds);
			}
		}

		/** Element counts beyond the remaining input fail before allocation. */
		int getCount(int max) {
			long n = getUint(64);
			if (n < 0 || n > max)
				throw fail("list of %s elements exceeds the ceiling of %d", Long.toUnsignedString(n), max);
			if (n > limit - i) throw fail("serial size exceeds the ceiling");
			if (n > buf.length - i) throw new BufferUnderflowException();
			return (int) n;
		}

		private int getLen(int max) {
			long n = getUint(64);
			if (n < 0 || n > max)
				throw fail("field value of %s bytes exceeds the ceiling of %d", Long.toUnsignedString(n), max);
			return (int) n;
		}

		byte[] getBytes(int max) {
			int n = getLen(max);
			int start = take(n);
			return Arrays.copyOfRange(buf, start, start + n);
		}

		String getText(int max) {
			int n = getLen(max);
			int start = take(n);
			return new String(buf, start, n, StandardCharsets.UTF_8);
		}

		/** @return the index of the next present field, or -1 at the end of the struct. */
		int field() {
			if (done) return -1;
			int h = getByte();
			if (h == 0 && !started) {
				done = true;
				return -1;
			}
			if (h < 2) throw fail("malformed field header 0x%02x", h);
			int index = (h >>> 1) - 1;
			if (index >= count)
				throw fail("field index %d out of range for a struct with %d fields", index, count);
			if (index < next) throw fail("field index %d is not in ascending order", index);
			next = index + 1;
			started = true;
			done = (h & 1) == 1;
			return index;
		}

	}

}
"#;

fn compile_wire(package: &Package) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("// {}", GENERATED_NOTICE));
    lines.push(String::new());
    lines.push(format!("package {};", java_package(&package.name)));
    lines.push(String::new());
    for import in [
        "java.io.ByteArrayOutputStream",
        "java.nio.BufferUnderflowException",
        "java.nio.charset.StandardCharsets",
        "java.time.DateTimeException",
        "java.time.Instant",
        "java.util.Arrays",
        "java.util.InputMismatchException",
    ] {
        lines.push(format!("import {};", import));
    }
    lines.push(String::new());
    lines.push(format!(
        "/** Ceilings and serialization helpers of package {}. */",
        java_package(&package.name)
    ));
    lines.push("public final class Wire {".to_string());
    lines.push(String::new());
    lines.push(format!("\t/** Upper limit for serial byte sizes: {}. */", package.size_max.expr));
    lines.push(format!("\tpublic static final int SIZE_MAX = {};", package.size_max.value));
    lines.push(String::new());
    lines.push(format!(
        "\t/** Default upper limit for the number of list elements: {}. */",
        package.list_max.expr
    ));
    lines.push(format!("\tpublic static final int LIST_MAX = {};", package.list_max.value));
    lines.push(String::new());
    lines.push("\t/** Upper limit for struct nesting, the top-level instance included. */".to_string());
    lines.push(format!("\tpublic static final int DEPTH_MAX = {};", DEPTH_MAX));
    lines.push(String::new());
    lines.push(JAVA_WIRE.to_string());
    lines.join("\n")
}
