use std::path::PathBuf;

use colf_wire::DEPTH_MAX;

use crate::{
    error::ColfError,
    generator::{push_doc, GeneratedFile, Generator, Language, GENERATED_NOTICE},
    types::{base_name, Field, FieldType, Package, ScalarType, Struct, StructRef},
    utils::{escape_keyword, to_pascal_case},
};

/// Field names that would clash with the generated methods.
const GO_METHODS: [&str; 7] = [
    "IsZero", "MarshalBinary", "MarshalNested", "MarshalTo", "Unmarshal", "UnmarshalBinary", "UnmarshalNested",
];

/// Identifiers in scope of the generated code besides the struct types: the
/// standard imports, the package-level wire helpers, the locals of the
/// generated methods and the predeclared names they use. Import aliases must
/// not shadow them.
const GO_RESERVED: &[&str] = &[
    "DecodeError", "DepthMax", "EncodeError", "ListMax", "SizeMax", "append", "binary", "bool", "buf",
    "byte", "d", "data", "decoder", "depth", "depthError", "e", "encoder", "err", "error", "false",
    "float32", "float64", "fmt", "i", "index", "int", "int16", "int32", "int64", "int8", "io", "last",
    "len", "limit", "make", "marshaler", "math", "n", "new", "nil", "o", "ok", "present", "s", "scan",
    "string", "time", "true", "uint16", "uint32", "uint64", "uint8", "unmarshaler", "v",
];

/// Package-private wire helpers, emitted once per package.
const GO_WIRE: &str = r#"// DecodeError reports malformed input or a ceiling violation.
type DecodeError struct {
	Offset int // byte position in the serial of the struct that failed
	Reason string
}

func (e *DecodeError) Error() string {
	return fmt.Sprintf("colf: decode at byte %d: %s", e.Offset, e.Reason)
}

// EncodeError reports a value that exceeds a ceiling.
type EncodeError struct {
	Reason string
}

func (e *EncodeError) Error() string {
	return "colf: encode: " + e.Reason
}

type marshaler interface {
	MarshalNested(buf []byte, depth int) ([]byte, error)
}

type unmarshaler interface {
	UnmarshalNested(data []byte, limit, depth int) (int, error)
}

func depthError() error {
	return &EncodeError{fmt.Sprintf("struct nesting exceeds the ceiling of %d levels", DepthMax)}
}

type encoder struct {
	buf   []byte
	depth int // instances open, this one included
}

// start returns the index of the last present field, or -1 after writing
// the header of an empty struct.
func (e *encoder) start(present []bool) int {
	last := -1
	for i, p := range present {
		if p {
			last = i
		}
	}
	if last < 0 {
		e.buf = append(e.buf, 0)
	}
	return last
}

func (e *encoder) header(index, last int) {
	h := byte(index+1) << 1
	if index == last {
		h |= 1
	}
	e.buf = append(e.buf, h)
}

func (e *encoder) putUint(v uint64) {
	for v > 0x7f {
		e.buf = append(e.buf, byte(v)|0x80)
		v >>= 7
	}
	e.buf = append(e.buf, byte(v))
}

func (e *encoder) putInt(v int64) {
	e.putUint(uint64(v<<1) ^ uint64(v>>63))
}

func (e *encoder) putBool(v bool) {
	if v {
		e.buf = append(e.buf, 1)
	} else {
		e.buf = append(e.buf, 0)
	}
}

func (e *encoder) putFloat32(v float32) {
	e.buf = binary.LittleEndian.AppendUint32(e.buf, math.Float32bits(v))
}

func (e *encoder) putFloat64(v float64) {
	e.buf = binary.LittleEndian.AppendUint64(e.buf, math.Float64bits(v))
}

func (e *encoder) putTime(t time.Time) {
	e.putInt(t.Unix())
	e.putUint(uint64(t.Nanosecond()))
}

func (e *encoder) putCount(n, max int) error {
	if n > max {
		return &EncodeError{fmt.Sprintf("list of %d elements exceeds the ceiling of %d", n, max)}
	}
	e.putUint(uint64(n))
	return nil
}

func (e *encoder) putBytes(b []byte, max int) error {
	if len(b) > max {
		return &EncodeError{fmt.Sprintf("field value of %d bytes exceeds the ceiling of %d", len(b), max)}
	}
	e.putUint(uint64(len(b)))
	e.buf = append(e.buf, b...)
	return nil
}

func (e *encoder) putText(s string, max int) error {
	if len(s) > max {
		return &EncodeError{fmt.Sprintf("field value of %d bytes exceeds the ceiling of %d", len(s), max)}
	}
	e.putUint(uint64(len(s)))
	e.buf = append(e.buf, s...)
	return nil
}

func (e *encoder) nested(v marshaler) error {
	var err error
	e.buf, err = v.MarshalNested(e.buf, e.depth)
	return err
}

type decoder struct {
	buf   []byte
	i     int
	limit int // reads never pass this position
	depth int // instances open, this one included
}

func (d *decoder) fail(format string, args ...interface{}) error {
	return &DecodeError{Offset: d.i, Reason: fmt.Sprintf(format, args...)}
}

func (d *decoder) take(n int) ([]byte, error) {
	if n > d.limit-d.i {
		return nil, d.fail("serial size exceeds the ceiling")
	}
	if n > len(d.buf)-d.i {
		return nil, io.ErrUnexpectedEOF
	}
	b := d.buf[d.i : d.i+n]
	d.i += n
	return b, nil
}

func (d *decoder) getByte() (byte, error) {
	b, err := d.take(1)
	if err != nil {
		return 0, err
	}
	return b[0], nil
}

// getUint reads a varint of at most bits significant bits, spread over no
// more than the bytes that width needs.
func (d *decoder) getUint(bits uint) (uint64, error) {
	var v uint64
	for shift := uint(0); shift < bits; shift += 7 {
		c, err := d.getByte()
		if err != nil {
			return 0, err
		}
		payload := uint64(c & 0x7f)
		if shift+7 > bits && payload>>(bits-shift) != 0 {
			return 0, d.fail("integer exceeds %d bits", bits)
		}
		v |= payload << shift
		if c&0x80 == 0 {
			return v, nil
		}
	}
	return 0, d.fail("integer exceeds %d bits", bits)
}

func (d *decoder) getInt(bits uint) (int64, error) {
	v, err := d.getUint(bits)
	return int64(v>>1) ^ -int64(v&1), err
}

func (d *decoder) getInt8() (int8, error) {
	v, err := d.getInt(8)
	return int8(v), err
}

func (d *decoder) getInt16() (int16, error) {
	v, err := d.getInt(16)
	return int16(v), err
}

func (d *decoder) getInt32() (int32, error) {
	v, err := d.getInt(32)
	return int32(v), err
}

func (d *decoder) getInt64() (int64, error) {
	return d.getInt(64)
}

func (d *decoder) getUint8() (uint8, error) {
	v, err := d.getUint(8)
	return uint8(v), err
}

func (d *decoder) getUint16() (uint16, error) {
	v, err := d.getUint(16)
	return uint16(v), err
}

func (d *decoder) getUint32() (uint32, error) {
	v, err := d.getUint(32)
	return uint32(v), err
}

func (d *decoder) getUint64() (uint64, error) {
	return d.getUint(64)
}

func (d *decoder) getBool() (bool, error) {
	c, err := d.getByte()
	if err != nil {
		return false, err
	}
	if c > 1 {
		return false, d.fail("invalid boolean byte %#02x", c)
	}
	return c == 1, nil
}

func (d *decoder) getFloat32() (float32, error) {
	b, err := d.take(4)
	if err != nil {
		return 0, err
	}
	return math.Float32frombits(binary.LittleEndian.Uint32(b)), nil
}

func (d *decoder) getFloat64() (float64, error) {
	b, err := d.take(8)
	if err != nil {
		return 0, err
	}
	return math.Float64frombits(binary.LittleEndian.Uint64(b)), nil
}

func (d *decoder) getTime() (time.Time, error) {
	s, err := d.getInt(64)
	if err != nil {
		return time.Time{}, err
	}
	ns, err := d.getUint(32)
	if err != nil {
		return time.Time{}, err
	}
	if ns >= 1e9 {
		return time.Time{}, d.fail("timestamp nanoseconds %d out of range", ns)
	}
	return time.Unix(s, int64(ns)), nil
}

// getCount reads a list element count. Every element takes at least one
// byte, so counts beyond the remaining input fail before allocation.
func (d *decoder) getCount(max int) (int, error) {
	n, err := d.getUint(64)
	if err != nil {
		return 0, err
	}
	if n > uint64(max) {
		return 0, d.fail("list of %d elements exceeds the ceiling of %d", n, max)
	}
	if n > uint64(d.limit-d.i) {
		return 0, d.fail("serial size exceeds the ceiling")
	}
	if n > uint64(len(d.buf)-d.i) {
		return 0, io.ErrUnexpectedEOF
	}
	return int(n), nil
}

func (d *decoder) getLen(max int) (int, error) {
	n, err := d.getUint(64)
	if err != nil {
		return 0, err
	}
	if n > uint64(max) {
		return 0, d.fail("field value of %d bytes exceeds the ceiling of %d", n, max)
	}
	return int(n), nil
}

func (d *decoder) getBytes(max int) ([]byte, error) {
	n, err := d.getLen(max)
	if err != nil {
		return nil, err
	}
	b, err := d.take(n)
	if err != nil {
		return nil, err
	}
	return append([]byte(nil), b...), nil
}

func (d *decoder) getText(max int) (string, error) {
	n, err := d.getLen(max)
	if err != nil {
		return "", err
	}
	b, err := d.take(n)
	return string(b), err
}

func (d *decoder) nested(v unmarshaler) error {
	n, err := v.UnmarshalNested(d.buf[d.i:], d.limit-d.i, d.depth)
	d.i += n
	return err
}

// scan tracks the field headers of one struct instance.
type scan struct {
	count, next   int
	started, done bool
}

// field returns the index of the next present field, or false once the
// struct is complete.
func (d *decoder) field(s *scan) (int, bool, error) {
	if s.done {
		return 0, false, nil
	}
	h, err := d.getByte()
	if err != nil {
		return 0, false, err
	}
	if h == 0 && !s.started {
		s.done = true
		return 0, false, nil
	}
	if h < 2 {
		return 0, false, d.fail("malformed field header %#02x", h)
	}
	index := int(h>>1) - 1
	if index >= s.count {
		return 0, false, d.fail("field index %d out of range for a struct with %d fields", index, s.count)
	}
	if index < s.next {
		return 0, false, d.fail("field index %d is not in ascending order", index)
	}
	s.next = index + 1
	s.started = true
	s.done = h&1 == 1
	return index, true, nil
}
"#;

/// Generates a `colf.go` per package, in a directory named after the
/// package path.
pub struct GoGenerator;

impl Generator for GoGenerator {
    fn language(&self) -> Language {
        Language::Go
    }

    fn generate(&self, packages: &[Package]) -> Result<Vec<GeneratedFile>, ColfError> {
        Ok(packages
            .iter()
            .map(|p| GeneratedFile {
                path:     PathBuf::from(&p.name).join("colf.go"),
                contents: compile_package_to_go(p),
            })
            .collect())
    }
}

fn type_name(name: &str) -> String {
    to_pascal_case(name)
}

fn field_name(name: &str) -> String {
    escape_keyword(to_pascal_case(name), &GO_METHODS)
}

/// Import names of the packages `package` depends on. Dependencies whose last
/// path segment is taken get the whole path, with underscores, and a trailing
/// underscore for as long as that is taken too.
fn import_names(package: &Package) -> Vec<(String, String)> {
    let mut taken: Vec<String> = GO_RESERVED.iter().map(|s| s.to_string()).collect();
    taken.push(package.base_name().to_string());
    let mut imports = Vec::new();
    for dep in package.dependencies() {
        let mut name = base_name(dep).to_string();
        if taken.contains(&name) {
            name = dep.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect();
        }
        while taken.contains(&name) {
            name.push('_');
        }
        taken.push(name.clone());
        imports.push((name, dep.to_string()));
    }
    imports.sort_by(|a, b| a.1.cmp(&b.1));
    imports
}

struct Context<'a> {
    package: &'a Package,
    imports: Vec<(String, String)>,
}

impl<'a> Context<'a> {
    fn struct_type(&self, r: &StructRef) -> String {
        if r.package == self.package.name {
            return type_name(&r.name);
        }
        let alias = self
            .imports
            .iter()
            .find(|(_, path)| *path == r.package)
            .map_or_else(|| base_name(&r.package).to_string(), |(alias, _)| alias.clone());
        format!("{}.{}", alias, type_name(&r.name))
    }

    fn element_type(&self, field: &Field) -> String {
        match &field.type_ {
            FieldType::Struct(r) => self.struct_type(r),
            FieldType::Scalar(t) => match t {
                ScalarType::Bool => "bool",
                ScalarType::Int8 => "int8",
                ScalarType::Int16 => "int16",
                ScalarType::Int32 => "int32",
                ScalarType::Int64 => "int64",
                ScalarType::Uint8 => "uint8",
                ScalarType::Uint16 => "uint16",
                ScalarType::Uint32 => "uint32",
                ScalarType::Uint64 => "uint64",
                ScalarType::Float32 => "float32",
                ScalarType::Float64 => "float64",
                ScalarType::Timestamp => "time.Time",
                ScalarType::Text => "string",
                ScalarType::Binary => "[]byte",
            }
            .to_string(),
        }
    }

    fn field_type(&self, field: &Field) -> String {
        let elem = self.element_type(field);
        if field.is_list {
            format!("[]{}", elem)
        } else if field.is_optional {
            format!("*{}", elem)
        } else {
            elem
        }
    }
}

fn size_max(field: &Field) -> String {
    field.size_max.map_or_else(|| "SizeMax".to_string(), |n| n.to_string())
}

fn list_max(field: &Field) -> String {
    field.list_max.map_or_else(|| "ListMax".to_string(), |n| n.to_string())
}

fn zero_test(field: &Field, place: &str) -> String {
    if field.is_list {
        return format!("len({}) == 0", place);
    }
    if field.is_optional {
        return format!("{} == nil", place);
    }
    match field.scalar() {
        Some(ScalarType::Bool) => format!("!{}", place),
        Some(ScalarType::Float32) => format!("math.Float32bits({}) == 0", place),
        Some(ScalarType::Float64) => format!("math.Float64bits({}) == 0", place),
        Some(ScalarType::Timestamp) | None => format!("{}.IsZero()", place),
        Some(ScalarType::Text) => format!("{} == \"\"", place),
        Some(ScalarType::Binary) => format!("len({}) == 0", place),
        Some(_) => format!("{} == 0", place),
    }
}

fn present_test(field: &Field, place: &str) -> String {
    if field.is_list {
        return format!("len({}) != 0", place);
    }
    if field.is_optional {
        return format!("{} != nil", place);
    }
    match field.scalar() {
        Some(ScalarType::Bool) => place.to_string(),
        Some(ScalarType::Float32) => format!("math.Float32bits({}) != 0", place),
        Some(ScalarType::Float64) => format!("math.Float64bits({}) != 0", place),
        Some(ScalarType::Timestamp) | None => format!("!{}.IsZero()", place),
        Some(ScalarType::Text) => format!("{} != \"\"", place),
        Some(ScalarType::Binary) => format!("len({}) != 0", place),
        Some(_) => format!("{} != 0", place),
    }
}

/// Lines that append one value; `ptr` addresses a struct value.
fn put_value(lines: &mut Vec<String>, indent: &str, field: &Field, value: &str, ptr: &str) {
    let checked = |lines: &mut Vec<String>, call: String| {
        lines.push(format!("{}if err := {}; err != nil {{", indent, call));
        lines.push(format!("{}\treturn buf, err", indent));
        lines.push(format!("{}}}", indent));
    };
    match field.scalar() {
        Some(ScalarType::Bool) => lines.push(format!("{}e.putBool({})", indent, value)),
        Some(ScalarType::Int8 | ScalarType::Int16 | ScalarType::Int32) => {
            lines.push(format!("{}e.putInt(int64({}))", indent, value))
        }
        Some(ScalarType::Int64) => lines.push(format!("{}e.putInt({})", indent, value)),
        Some(ScalarType::Uint8 | ScalarType::Uint16 | ScalarType::Uint32) => {
            lines.push(format!("{}e.putUint(uint64({}))", indent, value))
        }
        Some(ScalarType::Uint64) => lines.push(format!("{}e.putUint({})", indent, value)),
        Some(ScalarType::Float32) => lines.push(format!("{}e.putFloat32({})", indent, value)),
        Some(ScalarType::Float64) => lines.push(format!("{}e.putFloat64({})", indent, value)),
        Some(ScalarType::Timestamp) => lines.push(format!("{}e.putTime({})", indent, value)),
        Some(ScalarType::Text) => checked(lines, format!("e.putText({}, {})", value, size_max(field))),
        Some(ScalarType::Binary) => checked(lines, format!("e.putBytes({}, {})", value, size_max(field))),
        None => checked(lines, format!("e.nested({})", ptr)),
    }
}

fn get_call(field: &Field) -> String {
    match field.scalar() {
        Some(ScalarType::Bool) => "d.getBool()".to_string(),
        Some(ScalarType::Int8) => "d.getInt8()".to_string(),
        Some(ScalarType::Int16) => "d.getInt16()".to_string(),
        Some(ScalarType::Int32) => "d.getInt32()".to_string(),
        Some(ScalarType::Int64) => "d.getInt64()".to_string(),
        Some(ScalarType::Uint8) => "d.getUint8()".to_string(),
        Some(ScalarType::Uint16) => "d.getUint16()".to_string(),
        Some(ScalarType::Uint32) => "d.getUint32()".to_string(),
        Some(ScalarType::Uint64) => "d.getUint64()".to_string(),
        Some(ScalarType::Float32) => "d.getFloat32()".to_string(),
        Some(ScalarType::Float64) => "d.getFloat64()".to_string(),
        Some(ScalarType::Timestamp) => "d.getTime()".to_string(),
        Some(ScalarType::Text) => format!("d.getText({})", size_max(field)),
        Some(ScalarType::Binary) => format!("d.getBytes({})", size_max(field)),
        None => String::new(),
    }
}

/// Compiles one package into the source of a Go file.
pub fn compile_package_to_go(package: &Package) -> String {
    let ctx = Context { package, imports: import_names(package) };
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("// {}", GENERATED_NOTICE));
    lines.push(String::new());
    push_doc(&mut lines, "", "// ", &package.doc);
    lines.push(format!("package {}", package.base_name()));
    lines.push(String::new());
    lines.push("import (".to_string());
    for std_import in ["encoding/binary", "fmt", "io", "math", "time"] {
        lines.push(format!("\t\"{}\"", std_import));
    }
    if !ctx.imports.is_empty() {
        lines.push(String::new());
        for (alias, path) in &ctx.imports {
            lines.push(format!("\t{} \"{}\"", alias, path));
        }
    }
    lines.push(")".to_string());
    lines.push(String::new());

    lines.push(format!("// SizeMax is the upper limit for serial byte sizes: {}.", package.size_max.expr));
    lines.push(format!("const SizeMax = {}", package.size_max.value));
    lines.push(String::new());
    lines.push(format!(
        "// ListMax is the default upper limit for the number of list elements: {}.",
        package.list_max.expr
    ));
    lines.push(format!("const ListMax = {}", package.list_max.value));
    lines.push(String::new());
    lines.push("// DepthMax is the upper limit for struct nesting, the top-level instance".to_string());
    lines.push("// included.".to_string());
    lines.push(format!("const DepthMax = {}", DEPTH_MAX));

    for s in &package.structs {
        lines.push(String::new());
        generate_struct(&mut lines, &ctx, s);
    }

    lines.push(String::new());
    lines.push(GO_WIRE.trim_end().to_string());
    lines.push(String::new());
    lines.join("\n")
}

fn generate_struct(lines: &mut Vec<String>, ctx: &Context<'_>, s: &Struct) {
    let name = type_name(&s.name);

    push_doc(lines, "", "// ", &s.doc);
    if s.fields.is_empty() {
        lines.push(format!("type {} struct{{}}", name));
    } else {
        lines.push(format!("type {} struct {{", name));
        push_fields(lines, ctx, &s.fields);
        lines.push("}".to_string());
    }
    lines.push(String::new());

    // IsZero
    lines.push("// IsZero reports whether o holds default values only, in which case it".to_string());
    lines.push("// is left out as a field value.".to_string());
    lines.push(format!("func (o *{}) IsZero() bool {{", name));
    if s.fields.is_empty() {
        lines.push("\treturn true".to_string());
    } else {
        let tests: Vec<String> = s
            .fields
            .iter()
            .map(|f| zero_test(f, &format!("o.{}", field_name(&f.name))))
            .collect();
        lines.push(format!("\treturn {}", tests.join(" &&\n\t\t")));
    }
    lines.push("}".to_string());
    lines.push(String::new());

    // MarshalTo
    lines.push("// MarshalTo appends the serial of o to buf. The size ceiling is not".to_string());
    lines.push("// checked; see MarshalBinary.".to_string());
    lines.push(format!("func (o *{}) MarshalTo(buf []byte) ([]byte, error) {{", name));
    lines.push("\treturn o.MarshalNested(buf, 0)".to_string());
    lines.push("}".to_string());
    lines.push(String::new());

    // MarshalNested
    lines.push("// MarshalNested is MarshalTo for an instance inside depth others.".to_string());
    lines.push(format!("func (o *{}) MarshalNested(buf []byte, depth int) ([]byte, error) {{", name));
    lines.push("\tif depth >= DepthMax {".to_string());
    lines.push("\t\treturn buf, depthError()".to_string());
    lines.push("\t}".to_string());
    lines.push("\te := encoder{buf: buf, depth: depth + 1}".to_string());
    if s.fields.is_empty() {
        lines.push("\te.start(nil)".to_string());
    } else {
        lines.push("\tpresent := [...]bool{".to_string());
        for f in &s.fields {
            lines.push(format!("\t\t{},", present_test(f, &format!("o.{}", field_name(&f.name)))));
        }
        lines.push("\t}".to_string());
        lines.push("\tlast := e.start(present[:])".to_string());
        for (index, f) in s.fields.iter().enumerate() {
            let place = format!("o.{}", field_name(&f.name));
            lines.push(format!("\tif present[{}] {{", index));
            lines.push(format!("\t\te.header({}, last)", index));
            if f.is_list {
                lines.push(format!("\t\tif err := e.putCount(len({}), {}); err != nil {{", place, list_max(f)));
                lines.push("\t\t\treturn buf, err".to_string());
                lines.push("\t\t}".to_string());
                if f.struct_ref().is_some() {
                    lines.push(format!("\t\tfor i := range {} {{", place));
                    put_value(lines, "\t\t\t", f, "", &format!("&{}[i]", place));
                } else {
                    lines.push(format!("\t\tfor _, v := range {} {{", place));
                    put_value(lines, "\t\t\t", f, "v", "");
                }
                lines.push("\t\t}".to_string());
            } else if f.is_optional {
                put_value(lines, "\t\t", f, "", &place);
            } else if f.scalar() != Some(ScalarType::Bool) {
                put_value(lines, "\t\t", f, &place, &format!("&{}", place));
            }
            lines.push("\t}".to_string());
        }
    }
    lines.push("\treturn e.buf, nil".to_string());
    lines.push("}".to_string());
    lines.push(String::new());

    // MarshalBinary
    lines.push("// MarshalBinary encodes o as a top-level serial.".to_string());
    lines.push(format!("func (o *{}) MarshalBinary() ([]byte, error) {{", name));
    lines.push("\tbuf, err := o.MarshalTo(nil)".to_string());
    lines.push("\tif err != nil {".to_string());
    lines.push("\t\treturn nil, err".to_string());
    lines.push("\t}".to_string());
    lines.push("\tif len(buf) > SizeMax {".to_string());
    lines.push(
        "\t\treturn nil, &EncodeError{fmt.Sprintf(\"serial size of %d bytes exceeds the ceiling of %d\", len(buf), SizeMax)}"
            .to_string(),
    );
    lines.push("\t}".to_string());
    lines.push("\treturn buf, nil".to_string());
    lines.push("}".to_string());
    lines.push(String::new());

    // Unmarshal
    lines.push("// Unmarshal decodes the serial at the start of data into o, reading at".to_string());
    lines.push("// most limit bytes. It returns the number of bytes consumed.".to_string());
    lines.push(format!("func (o *{}) Unmarshal(data []byte, limit int) (int, error) {{", name));
    lines.push("\treturn o.UnmarshalNested(data, limit, 0)".to_string());
    lines.push("}".to_string());
    lines.push(String::new());

    // UnmarshalNested
    lines.push("// UnmarshalNested is Unmarshal for an instance inside depth others.".to_string());
    lines.push(format!("func (o *{}) UnmarshalNested(data []byte, limit, depth int) (int, error) {{", name));
    lines.push(format!("\t*o = {}{{}}", name));
    lines.push("\td := decoder{buf: data, limit: limit, depth: depth + 1}".to_string());
    lines.push("\tif d.depth > DepthMax {".to_string());
    lines.push("\t\treturn 0, d.fail(\"struct nesting exceeds the ceiling of %d levels\", DepthMax)".to_string());
    lines.push("\t}".to_string());
    if s.fields.is_empty() {
        lines.push("\t_, _, err := d.field(&scan{})".to_string());
        lines.push("\treturn d.i, err".to_string());
    } else {
        lines.push(format!("\ts := scan{{count: {}}}", s.fields.len()));
        lines.push("\tfor {".to_string());
        lines.push("\t\tindex, ok, err := d.field(&s)".to_string());
        lines.push("\t\tif err != nil || !ok {".to_string());
        lines.push("\t\t\treturn d.i, err".to_string());
        lines.push("\t\t}".to_string());
        lines.push("\t\tswitch index {".to_string());
        for (index, f) in s.fields.iter().enumerate() {
            lines.push(format!("\t\tcase {}:", index));
            get_field(lines, ctx, f);
        }
        lines.push("\t\t}".to_string());
        lines.push("\t\tif err != nil {".to_string());
        lines.push("\t\t\treturn d.i, err".to_string());
        lines.push("\t\t}".to_string());
        lines.push("\t}".to_string());
    }
    lines.push("}".to_string());
    lines.push(String::new());

    // UnmarshalBinary
    lines.push("// UnmarshalBinary decodes data, which must hold exactly one serial, into o.".to_string());
    lines.push(format!("func (o *{}) UnmarshalBinary(data []byte) error {{", name));
    lines.push("\tn, err := o.Unmarshal(data, SizeMax)".to_string());
    lines.push("\tif err != nil {".to_string());
    lines.push("\t\treturn err".to_string());
    lines.push("\t}".to_string());
    lines.push("\tif n < len(data) {".to_string());
    lines.push("\t\treturn &DecodeError{Offset: n, Reason: \"data after the serial\"}".to_string());
    lines.push("\t}".to_string());
    lines.push("\treturn nil".to_string());
    lines.push("}".to_string());
}

/// Struct fields in gofmt layout: names padded to a common column within each
/// run of fields that no doc comment interrupts.
fn push_fields(lines: &mut Vec<String>, ctx: &Context<'_>, fields: &[Field]) {
    let mut start = 0;
    while start < fields.len() {
        let mut end = start + 1;
        while end < fields.len() && fields[end].doc.is_empty() {
            end += 1;
        }
        let width = fields[start..end].iter().map(|f| field_name(&f.name).len()).max().unwrap_or(0);
        push_doc(lines, "\t", "// ", &fields[start].doc);
        for f in &fields[start..end] {
            lines.push(format!("\t{:<width$} {}", field_name(&f.name), ctx.field_type(f), width = width));
        }
        start = end;
    }
}

fn get_field(lines: &mut Vec<String>, ctx: &Context<'_>, f: &Field) {
    let place = format!("o.{}", field_name(&f.name));
    if f.is_list {
        lines.push("\t\t\tvar n int".to_string());
        lines.push(format!("\t\t\tif n, err = d.getCount({}); err != nil {{", list_max(f)));
        lines.push("\t\t\t\tbreak".to_string());
        lines.push("\t\t\t}".to_string());
        lines.push(format!("\t\t\t{} = make([]{}, n)", place, ctx.element_type(f)));
        lines.push(format!("\t\t\tfor i := range {} {{", place));
        if f.struct_ref().is_some() {
            lines.push(format!("\t\t\t\tif err = d.nested(&{}[i]); err != nil {{", place));
        } else {
            lines.push(format!("\t\t\t\tif {}[i], err = {}; err != nil {{", place, get_call(f)));
        }
        lines.push("\t\t\t\t\tbreak".to_string());
        lines.push("\t\t\t\t}".to_string());
        lines.push("\t\t\t}".to_string());
    } else if f.is_optional {
        lines.push(format!("\t\t\t{} = new({})", place, ctx.element_type(f)));
        lines.push(format!("\t\t\terr = d.nested({})", place));
    } else if f.struct_ref().is_some() {
        lines.push(format!("\t\t\terr = d.nested(&{})", place));
    } else if f.scalar() == Some(ScalarType::Bool) {
        lines.push(format!("\t\t\t{} = true", place));
    } else {
        lines.push(format!("\t\t\t{}, err = {}", place, get_call(f)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, linker::link, parser::parse_source};

    fn compile(sources: &[(&str, &str)], config: &Config) -> Vec<GeneratedFile> {
        let files: Vec<_> = sources.iter().map(|(p, t)| parse_source(p, t).unwrap()).collect();
        GoGenerator.generate(&link(&files, config).unwrap()).unwrap()
    }

    #[test]
    fn test_go_point() {
        let files = compile(
            &[("demo.colf", "// Package demo is a test.\npackage demo\ntype Point struct {\n\tx int32\n\ty int32\n}\n")],
            &Config::default(),
        );
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("demo/colf.go"));
        let code = &files[0].contents;
        assert!(code.starts_with("// Code generated by colf; DO NOT EDIT.\n\n// Package demo is a test.\npackage demo\n"));
        assert!(code.contains("const SizeMax = 16777216"));
        assert!(code.contains("type Point struct {\n\tX int32\n\tY int32\n}"));
        assert!(code.contains("\treturn o.X == 0 &&\n\t\to.Y == 0\n"));
        assert!(code.contains("\tif present[1] {\n\t\te.header(1, last)\n\t\te.putInt(int64(o.Y))\n\t}"));
        assert!(code.contains("\t\tcase 1:\n\t\t\to.Y, err = d.getInt32()\n"));
    }

    #[test]
    fn test_go_cross_package() {
        let config = Config::new("out").with_prefix("example.com/app").unwrap();
        let files = compile(
            &[
                ("a.colf", "package demo\ntype Route struct {\n\tstops []geo.Point [list=9]\n\tnext *Route\n\tat geo.Point\n}\n"),
                ("b.colf", "package geo\ntype Point struct {\n\tlat float64\n}\n"),
            ],
            &config,
        );
        assert_eq!(files[0].path, PathBuf::from("example.com/app/demo/colf.go"));
        let code = &files[0].contents;
        assert!(code.contains("\tgeo \"example.com/app/geo\"\n)"));
        assert!(code.contains("\tStops []geo.Point\n\tNext  *Route\n\tAt    geo.Point\n"));
        assert!(code.contains("\t\tif err := e.putCount(len(o.Stops), 9); err != nil {"));
        assert!(code.contains("\t\tfor i := range o.Stops {\n\t\t\tif err := e.nested(&o.Stops[i]); err != nil {"));
        assert!(code.contains("\t\t\to.Stops = make([]geo.Point, n)"));
        assert!(code.contains("\t\t\to.Next = new(Route)\n\t\t\terr = d.nested(o.Next)"));
        assert!(code.contains("\t\t\terr = d.nested(&o.At)"));
        assert!(code.contains("\te := encoder{buf: buf, depth: depth + 1}\n"));
        assert!(files[1].contents.contains("math.Float64bits(o.Lat) != 0"));
    }

    #[test]
    fn test_go_method_names_escaped() {
        let files = compile(&[("a.colf", "package demo\ntype A struct {\n\tis_zero bool\n}\n")], &Config::default());
        assert!(files[0].contents.contains("\tIsZero_ bool\n"));
    }

    #[test]
    fn test_go_rejects_directives() {
        let config = Config::new("out").with_super_class("com/example/Base").unwrap();
        match config.check_support("Go", GoGenerator.supports()) {
            Err(ColfError::Config(msg)) => assert_eq!(msg, "super class not supported with Go"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_go_depth_ceiling() {
        let files = compile(&[("a.colf", "package demo\ntype Node struct {\n\tnext *Node\n}\n")], &Config::default());
        let code = &files[0].contents;
        assert!(code.contains("const DepthMax = 128\n"));
        assert!(code.contains("func (o *Node) MarshalTo(buf []byte) ([]byte, error) {\n\treturn o.MarshalNested(buf, 0)\n}"));
        assert!(code.contains("\tif depth >= DepthMax {\n\t\treturn buf, depthError()\n\t}\n"));
        assert!(code.contains("func (o *Node) Unmarshal(data []byte, limit int) (int, error) {\n\treturn o.UnmarshalNested(data, limit, 0)\n}"));
        assert!(code.contains("\td := decoder{buf: data, limit: limit, depth: depth + 1}\n\tif d.depth > DepthMax {"));
    }

    #[test]
    fn test_go_import_alias_avoids_generated_names() {
        let files = compile(
            &[
                ("a.colf", "package demo\ntype A struct {\n\tt time.Clock\n\tr io.Stream\n\tv v.V\n}\n"),
                ("b.colf", "package time\ntype Clock struct {\n\tticks uint64\n}\n"),
                ("c.colf", "package io\ntype Stream struct {\n\tpos uint64\n}\n"),
                ("d.colf", "package v\ntype V struct {\n\tx uint8\n}\n"),
            ],
            &Config::default(),
        );
        let code = &files[0].contents;
        assert!(code.contains("\tio_ \"io\"\n\ttime_ \"time\"\n\tv_ \"v\"\n)"));
        assert!(code.contains("\tT time_.Clock\n\tR io_.Stream\n\tV v_.V\n"));
        assert!(code.contains("\t\"io\"\n\t\"math\"\n\t\"time\"\n"));
    }

    #[test]
    fn test_go_field_alignment() {
        let source = "package demo\ntype A struct {\n\tid uint64\n\tdisplay_name text\n\t// Tags are free form.\n\ttags []text\n\tok bool\n}\n";
        let files = compile(&[("a.colf", source)], &Config::default());
        assert!(files[0].contents.contains(
            "type A struct {\n\tId          uint64\n\tDisplayName string\n\t// Tags are free form.\n\tTags []string\n\tOk   bool\n}"
        ));
    }
}
