use chrono::NaiveDate;

use hotelrag_core::types::Comment;

/// Builder for comments with sensible neutral defaults.
#[derive(Debug, Clone)]
pub struct CommentBuilder {
    comment: Comment,
}

impl CommentBuilder {
    pub fn new(id: &str, text: &str) -> Self {
        Self {
            comment: Comment {
                id: id.into(),
                text: text.into(),
                score: 4.5,
                star: 5,
                room_type: None,
                fuzzy_room_type: None,
                travel_type: None,
                publish_date: NaiveDate::from_ymd_opt(2025, 1, 1),
                useful_count: 0,
                review_count: 0,
                category1: None,
                category2: None,
                category3: None,
                quality_score: 5.0,
                images: Vec::new(),
            },
        }
    }

    pub fn room(mut self, exact: &str, fuzzy: &str) -> Self {
        self.comment.room_type = Some(exact.into());
        self.comment.fuzzy_room_type = Some(fuzzy.into());
        self
    }

    pub fn date(mut self, y: i32, m: u32, d: u32) -> Self {
        self.comment.publish_date = NaiveDate::from_ymd_opt(y, m, d);
        self
    }

    pub fn undated(mut self) -> Self {
        self.comment.publish_date = None;
        self
    }

    pub fn quality(mut self, q: f64) -> Self {
        self.comment.quality_score = q;
        self
    }

    pub fn counts(mut self, useful: u32, reviews: u32) -> Self {
        self.comment.useful_count = useful;
        self.comment.review_count = reviews;
        self
    }

    pub fn category(mut self, c: &str) -> Self {
        let slot = [&mut self.comment.category1, &mut self.comment.category2, &mut self.comment.category3]
            .into_iter()
            .find(|s| s.is_none());
        if let Some(slot) = slot {
            *slot = Some(c.into());
        }
        self
    }

    pub fn travel(mut self, t: &str) -> Self {
        self.comment.travel_type = Some(t.into());
        self
    }

    pub fn build(self) -> Comment {
        self.comment
    }
}

/// A dozen reviews of one hotel covering rooms, breakfast, location and service.
pub fn hotel_corpus() -> Vec<Comment> {
    vec![
        CommentBuilder::new("suite-space", "套房空间很大，客厅和卧室分开，住得很舒服")
            .room("行政套房", "套房").category("房间").quality(8.0).counts(6, 20).date(2025, 6, 1).travel("家庭亲子").build(),
        CommentBuilder::new("suite-noise", "套房隔音一般，晚上能听到走廊声音")
            .room("豪华套房", "套房").category("房间").quality(6.0).counts(1, 4).date(2024, 11, 3).build(),
        CommentBuilder::new("open-space", "空间挺大的，视野很好，能看到花园")
            .category("房间").quality(7.0).counts(2, 8).date(2025, 3, 9).build(),
        CommentBuilder::new("king-bed", "大床房床很舒服，空间稍微小一点")
            .room("花园大床房", "大床房").category("房间").quality(6.5).counts(0, 3).date(2025, 2, 14).build(),
        CommentBuilder::new("breakfast-rich", "早餐种类丰富，中西式都有，现做的面条很好吃")
            .room("花园双床房", "双床房").category("早餐").quality(9.0).counts(12, 35).date(2025, 7, 20).travel("商务出差").build(),
        CommentBuilder::new("breakfast-poor", "早餐一般，种类比较少，去晚了就没什么吃的")
            .category("早餐").quality(5.5).counts(3, 6).date(2023, 5, 2).build(),
        CommentBuilder::new("location", "位置方便，离地铁站很近，周边吃饭的地方很多")
            .category("位置").quality(7.5).counts(4, 10).date(2024, 9, 18).build(),
        CommentBuilder::new("service", "前台服务热情，入住退房都很快")
            .category("服务").quality(7.0).counts(2, 12).date(2025, 5, 5).build(),
        CommentBuilder::new("pool", "游泳池很干净，健身房器材也比较新")
            .category("设施").quality(6.0).counts(1, 2).date(2024, 8, 8).build(),
        CommentBuilder::new("parking", "停车场车位紧张，周末很难停")
            .category("设施").category("交通").quality(5.0).counts(0, 1).undated().build(),
        CommentBuilder::new("family-room", "家庭房适合带孩子，空间宽敞还有儿童用品")
            .room("家庭房", "家庭房").category("房间").quality(8.5).counts(5, 15).date(2025, 4, 22).travel("家庭亲子").build(),
        CommentBuilder::new("wifi", "WiFi signal is strong and fast in every room")
            .category("设施").quality(4.0).date(2024, 1, 30).build(),
    ]
}
